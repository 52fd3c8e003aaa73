//! Error code constants

/// Runtime lifecycle error codes (0100-0199)
pub const ERR_BOOTSTRAP: &str = "E-POLY-0101";
pub const ERR_TERMINATED: &str = "E-POLY-0102";
pub const ERR_TIMEOUT: &str = "E-POLY-0103";
pub const ERR_RUNTIME_LOST: &str = "E-POLY-0104";

/// Protocol error codes (0200-0299)
pub const ERR_PROTOCOL: &str = "E-POLY-0201";

/// Input error detail codes (0400-0499)
pub const DETAIL_COEFFS_EMPTY: &str = "E-POLY-0401";
pub const DETAIL_COEFFS_NUMERIC: &str = "E-POLY-0402";
pub const DETAIL_COEFFS_DEGREE: &str = "E-POLY-0403";
pub const DETAIL_X_VALUE: &str = "E-POLY-0404";
pub const DETAIL_ORDER: &str = "E-POLY-0405";
pub const DETAIL_GA_OPTIONS: &str = "E-POLY-0406";

/// Numeric runtime error codes (0500-0599)
pub const ERR_ENGINE: &str = "E-POLY-0501";
