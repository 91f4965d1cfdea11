use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector3};

/// Plane-to-plane projective map, `dst ~ H * src`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    /// Map a point through `H`, or `None` when it lands on the line at infinity.
    #[cfg(test)]
    fn apply(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let q = self.h * p.to_homogeneous();
        (q.z.abs() >= 1e-15).then(|| Point2::new(q.x / q.z, q.y / q.z))
    }
}

/// Similarity moving the quad centroid to the origin with mean radius `sqrt(2)`.
fn conditioning(quad: &[Point2<f64>; 4]) -> Matrix3<f64> {
    let centroid = quad.iter().fold(Vector3::zeros(), |acc, p| acc + p.to_homogeneous()) / 4.0;
    let radius = quad
        .iter()
        .map(|p| (p.x - centroid.x).hypot(p.y - centroid.y))
        .sum::<f64>()
        / 4.0;
    let k = if radius > 1e-12 {
        std::f64::consts::SQRT_2 / radius
    } else {
        1.0
    };
    Matrix3::new(
        k, 0.0, -k * centroid.x, //
        0.0, k, -k * centroid.y, //
        0.0, 0.0, 1.0,
    )
}

fn transform(t: &Matrix3<f64>, p: Point2<f64>) -> Point2<f64> {
    Point2::from_homogeneous(t * p.to_homogeneous()).unwrap_or(p)
}

/// Compute H such that `dst ~ H * src` from exactly four correspondences.
///
/// Corner order must be consistent between `src` and `dst`. The result is
/// scaled so that `H[(2, 2)] == 1`; `None` is returned when the linear
/// system is singular (three collinear points) or that entry vanishes.
pub fn homography_from_4pt(src: &[Point2<f64>; 4], dst: &[Point2<f64>; 4]) -> Option<Homography> {
    let t_src = conditioning(src);
    let t_dst = conditioning(dst);

    // Two rows per pair with h33 fixed to 1:
    //   [x y 1 0 0 0 -ux -uy] h = u
    //   [0 0 0 x y 1 -vx -vy] h = v
    let mut lhs = SMatrix::<f64, 8, 8>::zeros();
    let mut rhs = SVector::<f64, 8>::zeros();
    for (i, (s, d)) in src.iter().zip(dst).enumerate() {
        let p = transform(&t_src, *s);
        let q = transform(&t_dst, *d);
        let (row_u, row_v) = (2 * i, 2 * i + 1);

        lhs.fixed_view_mut::<1, 3>(row_u, 0)
            .copy_from_slice(&[p.x, p.y, 1.0]);
        lhs.fixed_view_mut::<1, 3>(row_v, 3)
            .copy_from_slice(&[p.x, p.y, 1.0]);
        lhs.fixed_view_mut::<1, 2>(row_u, 6)
            .copy_from_slice(&[-q.x * p.x, -q.x * p.y]);
        lhs.fixed_view_mut::<1, 2>(row_v, 6)
            .copy_from_slice(&[-q.y * p.x, -q.y * p.y]);
        rhs[row_u] = q.x;
        rhs[row_v] = q.y;
    }

    let sol = lhs.lu().solve(&rhs)?;
    if !sol.iter().all(|v| v.is_finite()) {
        return None;
    }
    let conditioned = Matrix3::new(
        sol[0], sol[1], sol[2], //
        sol[3], sol[4], sol[5], //
        sol[6], sol[7], 1.0,
    );

    let h = t_dst.try_inverse()? * conditioned * t_src;
    let scale = h[(2, 2)];
    (scale.abs() >= 1e-12).then(|| Homography { h: h / scale })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn near(a: Point2<f64>, b: Point2<f64>, tol: f64) -> bool {
        (a - b).norm() < tol
    }

    #[test]
    fn apply_rejects_points_at_infinity() {
        let h = Homography {
            h: Matrix3::new(
                1.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, //
                1.0, 0.0, 0.0,
            ),
        };
        assert!(h.apply(Point2::new(0.0, 3.0)).is_none());
        assert_eq!(h.apply(Point2::new(2.0, 4.0)), Some(Point2::new(1.0, 2.0)));
    }

    #[test]
    fn solve_matches_projective_ground_truth() {
        let truth = Homography {
            h: Matrix3::new(
                0.8, 0.05, 120.0, //
                -0.02, 1.1, 80.0, //
                0.0009, -0.0004, 1.0,
            ),
        };
        let src = [
            Point2::new(0.0, 0.0),
            Point2::new(180.0, 0.0),
            Point2::new(180.0, 130.0),
            Point2::new(0.0, 130.0),
        ];
        let dst = src.map(|p| truth.apply(p).expect("finite"));

        let solved = homography_from_4pt(&src, &dst).expect("solvable");
        assert!((solved.h[(2, 2)] - 1.0).abs() < 1e-15);
        for p in [
            Point2::new(10.0, 5.0),
            Point2::new(90.0, 65.0),
            Point2::new(175.0, 125.0),
        ] {
            let got = solved.apply(p).expect("finite");
            let want = truth.apply(p).expect("finite");
            assert!(near(got, want, 1e-6), "{got} vs {want}");
        }
    }

    #[test]
    fn metric_square_to_pixels_hits_every_corner() {
        let s = 0.015;
        let model = [
            Point2::new(-s, s),
            Point2::new(s, s),
            Point2::new(s, -s),
            Point2::new(-s, -s),
        ];
        let image = [
            Point2::new(301.2, 198.7),
            Point2::new(352.9, 203.4),
            Point2::new(349.1, 257.0),
            Point2::new(296.4, 251.8),
        ];
        let h = homography_from_4pt(&model, &image).expect("solvable");
        for (m, px) in model.iter().zip(&image) {
            assert!(near(h.apply(*m).expect("finite"), *px, 1e-8));
        }
    }

    #[test]
    fn coincident_destination_is_rejected() {
        let src = [
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        let dst = [Point2::new(42.0, 17.0); 4];
        assert!(homography_from_4pt(&src, &dst).is_none());
    }
}
