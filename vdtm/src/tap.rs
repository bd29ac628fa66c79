// Copyright 2024 RISC-V debug bridge contributors
// Dual licensed under the Apache 2.0 and MIT licenses.

//! The classic 16-state IEEE 1149.1 TAP controller FSM.

/// One of the sixteen states of the JTAG TAP controller, a Moore machine
/// stepped on every TCK rising edge by the current TMS level.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TapState {
    TestLogicReset,
    RunTestIdle,
    SelectDrScan,
    CaptureDr,
    ShiftDr,
    Exit1Dr,
    PauseDr,
    Exit2Dr,
    UpdateDr,
    SelectIrScan,
    CaptureIr,
    ShiftIr,
    Exit1Ir,
    PauseIr,
    Exit2Ir,
    UpdateIr,
}

impl Default for TapState {
    fn default() -> Self {
        TapState::TestLogicReset
    }
}

/// Advance the TAP controller by one TMS-qualified TCK edge. Both outgoing
/// edges of every state are defined per IEEE 1149.1; `TestLogicReset`
/// self-loops on `tms == true`.
pub const fn step(state: TapState, tms: bool) -> TapState {
    use TapState::*;
    match (state, tms) {
        (TestLogicReset, true) => TestLogicReset,
        (TestLogicReset, false) => RunTestIdle,

        (RunTestIdle, true) => SelectDrScan,
        (RunTestIdle, false) => RunTestIdle,

        (SelectDrScan, true) => SelectIrScan,
        (SelectDrScan, false) => CaptureDr,

        (CaptureDr, true) => Exit1Dr,
        (CaptureDr, false) => ShiftDr,

        (ShiftDr, true) => Exit1Dr,
        (ShiftDr, false) => ShiftDr,

        (Exit1Dr, true) => UpdateDr,
        (Exit1Dr, false) => PauseDr,

        (PauseDr, true) => Exit2Dr,
        (PauseDr, false) => PauseDr,

        (Exit2Dr, true) => UpdateDr,
        (Exit2Dr, false) => ShiftDr,

        (UpdateDr, true) => SelectDrScan,
        (UpdateDr, false) => RunTestIdle,

        (SelectIrScan, true) => TestLogicReset,
        (SelectIrScan, false) => CaptureIr,

        (CaptureIr, true) => Exit1Ir,
        (CaptureIr, false) => ShiftIr,

        (ShiftIr, true) => Exit1Ir,
        (ShiftIr, false) => ShiftIr,

        (Exit1Ir, true) => UpdateIr,
        (Exit1Ir, false) => PauseIr,

        (PauseIr, true) => Exit2Ir,
        (PauseIr, false) => PauseIr,

        (Exit2Ir, true) => UpdateIr,
        (Exit2Ir, false) => ShiftIr,

        (UpdateIr, true) => SelectDrScan,
        (UpdateIr, false) => RunTestIdle,
    }
}
