// Copyright (c) 2026 Omen Fan Utility Contributors
// Licensed under the MIT License

//! Fan control for HP OMEN laptops via the embedded controller (EC).
//!
//! The EC exposes its address space through a debugfs file; fan duty,
//! BIOS-control and temperature registers live at fixed offsets inside it.
//! This library provides the register accessor, the temperature-to-speed
//! curve, and the control pipeline (smoothing, hysteresis, deadband) used
//! by the `omen-fand` daemon and the diagnostic tools.

pub mod config;
pub mod control;
pub mod curve;
pub mod ec;
pub mod lifecycle;
pub mod logger;
