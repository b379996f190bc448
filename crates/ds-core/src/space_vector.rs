//! Three-phase <-> two-axis space-vector transforms.
//!
//! The complex space vector uses amplitude-invariant scaling:
//!
//! ```text
//! v = 2/3 * (a + b*exp(j*2*pi/3) + c*exp(j*4*pi/3))
//! ```
//!
//! The zero-sequence component `(a + b + c) / 3` is lost by the complex form
//! alone; [`AlphaBetaZero`] carries it so that the pair of transforms is a
//! bijection on the whole of R^3.

use crate::numeric::Real;

/// Complex scalar used for space vectors.
pub type Complex64 = nalgebra::Complex<Real>;

const SQRT3: Real = 1.732_050_807_568_877_2;

/// Space vector of a three-phase quantity (zero sequence discarded).
#[inline]
pub fn abc_to_complex(abc: [Real; 3]) -> Complex64 {
    let [a, b, c] = abc;
    Complex64::new((2.0 * a - b - c) / 3.0, (b - c) / SQRT3)
}

/// Zero-sequence-free phase quantities of a space vector.
#[inline]
pub fn complex_to_abc(v: Complex64) -> [Real; 3] {
    let half_re = 0.5 * v.re;
    let half_im = 0.5 * SQRT3 * v.im;
    [v.re, -half_re + half_im, -half_re - half_im]
}

/// Space vector together with the zero-sequence component.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlphaBetaZero {
    pub alpha_beta: Complex64,
    pub zero: Real,
}

impl AlphaBetaZero {
    /// Forward transform (total).
    pub fn from_abc(abc: [Real; 3]) -> Self {
        Self {
            alpha_beta: abc_to_complex(abc),
            zero: (abc[0] + abc[1] + abc[2]) / 3.0,
        }
    }

    /// Inverse transform (total).
    pub fn to_abc(self) -> [Real; 3] {
        let [a, b, c] = complex_to_abc(self.alpha_beta);
        [a + self.zero, b + self.zero, c + self.zero]
    }
}

/// Convert a voltage reference into phase duty ratios.
///
/// Uses min-max zero-sequence injection so the full linear range of the
/// converter is available, then saturates each ratio to `[0, 1]`.
pub fn duty_ratios_from_voltage(u_ref: Complex64, u_dc: Real) -> [Real; 3] {
    let u_abc = complex_to_abc(u_ref);
    let max = u_abc.iter().copied().fold(Real::NEG_INFINITY, Real::max);
    let min = u_abc.iter().copied().fold(Real::INFINITY, Real::min);
    let u_0 = 0.5 * (max + min);
    u_abc.map(|u| ((u - u_0) / u_dc + 0.5).clamp(0.0, 1.0))
}

/// Largest voltage magnitude realisable without over-modulation.
pub fn max_linear_voltage(u_dc: Real) -> Real {
    u_dc / SQRT3
}
