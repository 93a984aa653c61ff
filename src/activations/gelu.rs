//! GELU (Gaussian Error Linear Unit), tanh approximation:
//! `GELU(x) ≈ 0.5 x (1 + tanh(sqrt(2/π) (x + 0.044715 x³)))`

use super::functions::SATURATION_LIMIT;

const COEFF: f32 = 0.044715;

#[inline]
fn sqrt_2_over_pi() -> f32 {
    (2.0_f32 / std::f32::consts::PI).sqrt()
}

pub fn gelu(x: f32) -> f32 {
    if x >= SATURATION_LIMIT {
        return x;
    }
    if x <= -SATURATION_LIMIT {
        return 0.0;
    }
    let inner = sqrt_2_over_pi() * (x + COEFF * x.powi(3));
    0.5 * x * (1.0 + inner.tanh())
}

pub fn gelu_derivative(x: f32) -> f32 {
    if x >= SATURATION_LIMIT {
        return 1.0;
    }
    if x <= -SATURATION_LIMIT {
        return 0.0;
    }
    let k = sqrt_2_over_pi();
    let inner = k * (x + COEFF * x.powi(3));
    let tanh_inner = inner.tanh();
    let sech2_inner = 1.0 - tanh_inner * tanh_inner;
    0.5 * (1.0 + tanh_inner) + 0.5 * x * sech2_inner * k * (1.0 + 3.0 * COEFF * x * x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gelu_shape() {
        assert_eq!(gelu(0.0), 0.0);
        assert!((gelu(3.0) - 3.0).abs() < 0.01);
        assert!(gelu(-3.0).abs() < 0.01);
        assert!((gelu_derivative(0.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_gelu_derivative_matches_finite_difference() {
        for &x in &[-2.0f32, -0.5, 0.3, 1.7] {
            let h = 1e-2;
            let numeric = (gelu(x + h) - gelu(x - h)) / (2.0 * h);
            assert!((numeric - gelu_derivative(x)).abs() < 1e-2, "x = {}", x);
        }
    }
}
