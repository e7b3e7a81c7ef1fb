//! Mathematical constants

/// ln(2)
pub const LN_2: f64 = std::f64::consts::LN_2;
/// 0.5 ln(2π)
pub const HALF_LN_2PI: f64 = 0.918_938_533_204_672_7;
/// 0.5 ln(π)
pub const HALF_LN_PI: f64 = 0.572_364_942_924_700_1;
/// ln(π)
pub const LN_PI: f64 = 1.144_729_885_849_400_2;
/// ln(2π)
pub const LN_2PI: f64 = 1.837_877_066_409_345_3;
