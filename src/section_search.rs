use crate::{objective::Objective, sparse::SparseVec};

/// Golden ratio conjugate, (sqrt(5) - 1) / 2.
pub const PHI: f64 = 0.618_033_988_749_894_8;

/// Minimize `obj` on the segment `[a, b]` and return the best fraction
/// observed, endpoints included.
///
/// Reducible objectives are searched through their reduced form; evaluating
/// the full-dimensional function inside a 1-D search would dominate runtime.
pub fn section_search(
    a: &SparseVec,
    b: &SparseVec,
    obj: &dyn Objective,
    iterations: usize,
    golden: bool,
    b2: f64,
    b3: f64,
) -> f64 {
    if let Some(reducible) = obj.reducible() {
        let ya = reducible.reduce(a);
        let yb = reducible.reduce(b);
        let reduced = reducible.reduced_objective();
        return section_search(&ya, &yb, reduced.as_ref(), iterations, golden, b2, b3);
    }
    if golden {
        golden_section(a, b, obj, iterations)
    } else {
        general_section(a, b, obj, iterations, b2, b3)
    }
}

/// Standard golden-section search with interior points at `1 - PHI` and `PHI`.
fn golden_section(a: &SparseVec, b: &SparseVec, obj: &dyn Objective, iterations: usize) -> f64 {
    let mut x1 = a.clone();
    let mut x4 = b.clone();
    let mut x2 = b.clone();
    x2.sub_assign(a);
    x2.scale(1.0 - PHI);
    x2.add_assign(a);
    let mut x3 = x1.clone();
    x3.add_assign(&x4);
    x3.sub_assign(&x2);

    let f1 = obj.value(a);
    let f4 = obj.value(b);
    let mut f2 = obj.value(&x2);
    let mut f3 = obj.value(&x3);
    let (mut b1, mut b4) = (0.0, 1.0);
    let (mut b2, mut b3) = (1.0 - PHI, PHI);

    let mut fm = f1;
    let mut bm = 0.0;
    if fm > f2 {
        fm = f2;
        bm = b2;
    }
    if fm > f3 {
        fm = f3;
        bm = b3;
    }
    if fm > f4 {
        fm = f4;
        bm = b4;
    }

    for _ in 0..iterations {
        if f2 > f3 {
            // Discard the left outer point; mirror a new right interior point.
            std::mem::swap(&mut x1, &mut x2);
            std::mem::swap(&mut x2, &mut x3);
            f2 = f3;
            b1 = b2;
            b2 = b3;

            x3.clone_from(&x1);
            x3.add_assign(&x4);
            x3.sub_assign(&x2);
            f3 = obj.value(&x3);
            b3 = b1 + b4 - b2;

            if fm > f3 {
                fm = f3;
                bm = b3;
            }
        } else {
            std::mem::swap(&mut x4, &mut x3);
            std::mem::swap(&mut x3, &mut x2);
            f3 = f2;
            b4 = b3;
            b3 = b2;

            x2.clone_from(&x1);
            x2.add_assign(&x4);
            x2.sub_assign(&x3);
            f2 = obj.value(&x2);
            b2 = b1 + b4 - b3;

            if fm > f2 {
                fm = f2;
                bm = b2;
            }
        }
    }
    bm
}

/// Three-point section search with caller-chosen interior fractions, a secant
/// lower-bound estimate of the minimum, and early termination once the bound
/// closes on the best value.
fn general_section(
    a: &SparseVec,
    b: &SparseVec,
    obj: &dyn Objective,
    iterations: usize,
    mut b2: f64,
    mut b3: f64,
) -> f64 {
    let mut x1 = a.clone();
    let mut x4 = b.clone();
    let mut x2 = b.clone();
    x2.sub_assign(a);
    x2.scale(b2);
    x2.add_assign(a);
    let mut x3 = b.clone();
    x3.sub_assign(a);
    x3.scale(b3);
    x3.add_assign(a);

    let mut f1 = obj.value(a);
    let mut f4 = obj.value(b);
    let mut f2 = obj.value(&x2);
    let mut f3 = obj.value(&x3);
    let (mut b1, mut b4) = (0.0, 1.0);

    let mut fm = f1;
    let mut bm = 0.0;
    if fm > f2 {
        fm = f2;
        bm = b2;
    }
    if fm > f3 {
        fm = f3;
        bm = b3;
    }
    if fm > f4 {
        fm = f4;
        bm = b4;
    }

    let mut fbound = 0.0_f64;
    for _ in 0..iterations {
        // Keep the interior points ordered x1 -> x2 -> x3 -> x4.
        if b2 > b3 {
            std::mem::swap(&mut x2, &mut x3);
            std::mem::swap(&mut b2, &mut b3);
            std::mem::swap(&mut f2, &mut f3);
        }

        // Interior points collapsed: force a golden spacing step to recover.
        if (b2 - b3).abs() < 1e-12 && (f2 - f3).abs() < 1e-6 {
            x3.sub_assign(&x4);
            x3.scale(PHI - 1.0);
            x3.add_assign(&x2);
            f3 = obj.value(&x3);
            b3 = (b3 - b4) * (PHI - 1.0) + b2;
            if fm > f3 {
                fm = f3;
                bm = b3;
            }
        }

        if f2 > f3 {
            let fnewbound = (b4 - b1) / (b2 - b1) * (f2 - f1) + f1;
            if fnewbound > fbound {
                fbound = fnewbound;
            }

            std::mem::swap(&mut x1, &mut x2);
            std::mem::swap(&mut x2, &mut x3);
            f1 = f2;
            f2 = f3;
            b1 = b2;
            b2 = b3;

            x3.clone_from(&x1);
            x3.add_assign(&x4);
            x3.sub_assign(&x2);
            f3 = obj.value(&x3);
            b3 = b1 + b4 - b2;

            if fm > f3 {
                fm = f3;
                bm = b3;
            }
        } else {
            let fnewbound = (b1 - b4) / (b3 - b4) * (f3 - f4) + f4;
            if fnewbound > fbound {
                fbound = fnewbound;
            }

            std::mem::swap(&mut x4, &mut x3);
            std::mem::swap(&mut x3, &mut x2);
            f4 = f3;
            f3 = f2;
            b4 = b3;
            b3 = b2;

            x2.clone_from(&x1);
            x2.add_assign(&x4);
            x2.sub_assign(&x3);
            f2 = obj.value(&x2);
            b2 = b1 + b4 - b3;

            if fm > f2 {
                fm = f2;
                bm = b2;
            }
        }

        if (fbound - fm).abs() / (fbound.abs() + fm.abs()) < 0.5e-9 {
            break;
        }
    }
    bm
}

/// Naive fallback: evaluate `n + 1` equally spaced points and return the
/// argmin fraction. Deterministic; used when section search is disabled.
pub fn naive_line_search(
    a: &SparseVec,
    b: &SparseVec,
    obj: &dyn Objective,
    iterations: usize,
) -> f64 {
    if let Some(reducible) = obj.reducible() {
        let ya = reducible.reduce(a);
        let yb = reducible.reduce(b);
        let reduced = reducible.reduced_objective();
        return naive_line_search(&ya, &yb, reduced.as_ref(), iterations);
    }

    let mut x = a.clone();
    let mut dx = b.clone();
    dx.sub_assign(a);
    dx.scale(1.0 / iterations as f64);

    let mut fmin = obj.value(&x);
    let mut imin = 0usize;
    for i in 0..iterations {
        x.add_assign(&dx);
        let f = obj.value(&x);
        if f < fmin {
            fmin = f;
            imin = i + 1;
        }
    }
    imin as f64 / iterations as f64
}
