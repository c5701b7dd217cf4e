//! Pressure field construction from an options chain.
//!
//! ```text
//! ChainSnapshot
//!   │ per-contract exposure × exp(-λ·|K−S|/S)
//!   ▼
//! DealerPositioning (sign, net Greeks, coverage confidence)
//!   │ split at spot, vanna absorber, charm time scaling
//!   ▼
//! PressureField (up/down gamma, vanna, charm + pin zones)
//! ```

mod dealer;
mod field;

pub use dealer::DealerPositioning;
pub use field::{
    vanna_shock_absorber, FieldRegime, PinZone, PressureField, PressureFieldBuilder,
    VANNA_ABSORBER_FLOOR,
};

pub(crate) use crate::engine::config::PressureConfig;
