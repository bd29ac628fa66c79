// Copyright 2024 RISC-V debug bridge contributors
// Dual licensed under the Apache 2.0 and MIT licenses.

//! Bit-accurate emulator of the RISC-V JTAG Debug Transport Module (DTM)
//! described in the RISC-V External Debug Support spec (v0.13.2).
//!
//! This crate consumes a raw JTAG bit stream one TCK edge at a time (see
//! [`Vdtm::set_tck`] and friends) and produces TDO edges, translating DMI
//! register accesses decoded out of the DR shift register into two upcalls:
//! [`Vdtm::bind_dmi_write`] and [`Vdtm::bind_dmi_read`]. It has no notion of
//! what sits on the other end of those upcalls — that's `swd-dmi`'s job.

#![cfg_attr(not(test), no_std)]

mod tap;

pub use tap::TapState;

/// IR value selecting the 1-bit BYPASS register.
pub const IR_BYPASS: u8 = 0x00;
/// IR value selecting the 32-bit IDCODE register (also the TAP reset value).
pub const IR_IDCODE: u8 = 0x01;
/// IR value selecting the 32-bit DTMCS register.
pub const IR_DTMCS: u8 = 0x10;
/// IR value selecting the DMI register (width ABITS+34).
pub const IR_DMI: u8 = 0x11;

/// Width in bits of the IR shift register.
pub const W_IR: u32 = 5;
/// Width in bits of the DMI address field.
pub const ABITS: u32 = 8;
/// Width in bits of the DMI shift register: ABITS address + 32 data + 2 op.
pub const W_DMI: u32 = ABITS + 34;

const DTMCS_VERSION: u64 = 1;
const DTMCS_IDLE_HINT: u64 = 0;

const DMI_OP_READ: u8 = 1;
const DMI_OP_WRITE: u8 = 2;

/// Returns the current DR width for a given IR value.
///
/// 32 bits for IDCODE and DTMCS, ABITS+34 for DMI, 1 bit (BYPASS) for
/// everything else including undefined instructions.
pub const fn dr_len(ir: u8) -> u32 {
    match ir {
        IR_IDCODE => 32,
        IR_DTMCS => 32,
        IR_DMI => W_DMI,
        _ => 1,
    }
}

const fn dtmcs_value() -> u64 {
    DTMCS_VERSION | ((ABITS as u64) << 4) | (DTMCS_IDLE_HINT << 12)
}

/// Virtual JTAG DTM instance.
///
/// Owns the TAP state, the IR register, a variable-width DR shifter wide
/// enough for the widest DR (ABITS+34 bits), the latched result of the last
/// DMI read, and the current/driven line levels. All mutation happens
/// through the four pin entry points [`set_tms`],
/// [`set_tdi`], [`set_tck`] and [`get_tdo`].
///
/// [`set_tms`]: Vdtm::set_tms
/// [`set_tdi`]: Vdtm::set_tdi
/// [`set_tck`]: Vdtm::set_tck
/// [`get_tdo`]: Vdtm::get_tdo
pub struct Vdtm<'a> {
    idcode: u32,
    ir: u8,
    shifter: u64,
    tap_state: TapState,
    dmi_rdata: u32,

    tck: bool,
    tms: bool,
    tdi: bool,
    tdo: bool,

    dmi_write: Option<&'a mut dyn FnMut(u8, u32)>,
    dmi_read: Option<&'a mut dyn FnMut(u8) -> u32>,
}

impl<'a> Vdtm<'a> {
    /// Construct a new VDTM. `idcode` is returned verbatim by the IDCODE DR
    /// on capture and whenever the TAP is reset.
    pub const fn new(idcode: u32) -> Self {
        Vdtm {
            idcode,
            ir: IR_IDCODE,
            shifter: 0,
            tap_state: TapState::TestLogicReset,
            dmi_rdata: 0,
            tck: false,
            tms: false,
            tdi: false,
            tdo: false,
            dmi_write: None,
            dmi_read: None,
        }
    }

    /// Bind the `dmi_write(addr, data)` upcall, invoked on every decoded
    /// DMI write UPDATE-DR. Leaving it unbound silently drops DMI writes.
    pub fn bind_dmi_write(&mut self, f: &'a mut dyn FnMut(u8, u32)) {
        self.dmi_write = Some(f);
    }

    /// Unbind the `dmi_write` upcall.
    pub fn unbind_dmi_write(&mut self) {
        self.dmi_write = None;
    }

    /// Bind the `dmi_read(addr) -> data` upcall, invoked on every decoded
    /// DMI read UPDATE-DR; its return value is latched for the next
    /// CAPTURE-DR. Leaving it unbound silently drops DMI reads (the latched
    /// value is left unchanged).
    pub fn bind_dmi_read(&mut self, f: &'a mut dyn FnMut(u8) -> u32) {
        self.dmi_read = Some(f);
    }

    /// Unbind the `dmi_read` upcall.
    pub fn unbind_dmi_read(&mut self) {
        self.dmi_read = None;
    }

    /// Current TAP controller state.
    pub fn tap_state(&self) -> TapState {
        self.tap_state
    }

    /// Current IR register contents (5 bits).
    pub fn ir(&self) -> u8 {
        self.ir
    }

    /// Set the TMS line. Takes effect on the next rising TCK edge.
    pub fn set_tms(&mut self, v: bool) {
        self.tms = v;
    }

    /// Set the TDI line. Takes effect on the next rising TCK edge.
    pub fn set_tdi(&mut self, v: bool) {
        self.tdi = v;
    }

    /// Set the TCK line. Detects the edge against the previously stored
    /// level: state mutation happens on the rising edge, TDO is refreshed
    /// on the falling edge, and the new level is committed last.
    pub fn set_tck(&mut self, v: bool) {
        match (self.tck, v) {
            (false, true) => self.rising_edge(),
            (true, false) => self.refresh_tdo(),
            _ => {}
        }
        self.tck = v;
    }

    /// Read the latched TDO line.
    pub fn get_tdo(&self) -> bool {
        self.tdo
    }

    fn rising_edge(&mut self) {
        #[cfg(feature = "defmt")]
        defmt::trace!("vdtm: rising edge in {:?}, tms={}, tdi={}", self.tap_state, self.tms, self.tdi);

        match self.tap_state {
            TapState::TestLogicReset => self.ir = IR_IDCODE,
            TapState::CaptureIr => self.shifter = self.ir as u64,
            TapState::ShiftIr => {
                self.shifter = (self.shifter >> 1) | ((self.tdi as u64) << (W_IR - 1));
            }
            TapState::UpdateIr => {
                self.ir = (self.shifter & 0x1F) as u8;
                #[cfg(feature = "defmt")]
                defmt::debug!("vdtm: ir updated to {:#04x}", self.ir);
            }
            TapState::CaptureDr => self.capture_dr(),
            TapState::ShiftDr => {
                let len = dr_len(self.ir);
                self.shifter = (self.shifter >> 1) | ((self.tdi as u64) << (len - 1));
            }
            TapState::UpdateDr => self.update_dr(),
            _ => {}
        }

        self.tap_state = tap::step(self.tap_state, self.tms);
    }

    fn capture_dr(&mut self) {
        self.shifter = match self.ir {
            IR_BYPASS => 0,
            IR_IDCODE => self.idcode as u64,
            IR_DTMCS => dtmcs_value(),
            IR_DMI => (self.dmi_rdata as u64) << 2,
            _ => self.shifter,
        };
    }

    fn update_dr(&mut self) {
        match self.ir {
            IR_DTMCS => self.handle_dtmcs_write(),
            IR_DMI => self.handle_dmi_update(),
            _ => {}
        }
    }

    /// DTMCS is read-only advertised; dmireset/dmihardreset/busy handshakes
    /// are out of scope (see crate docs), so a write is silently accepted
    /// and does nothing.
    fn handle_dtmcs_write(&mut self) {}

    fn handle_dmi_update(&mut self) {
        let op = (self.shifter & 0b11) as u8;
        let data = ((self.shifter >> 2) & 0xFFFF_FFFF) as u32;
        let addr = ((self.shifter >> 34) & 0xFF) as u8;

        match op {
            DMI_OP_WRITE => {
                #[cfg(feature = "defmt")]
                defmt::debug!("vdtm: dmi_write(addr={:#04x}, data={:#010x})", addr, data);
                if let Some(cb) = &mut self.dmi_write {
                    cb(addr, data);
                }
            }
            DMI_OP_READ => {
                if let Some(cb) = &mut self.dmi_read {
                    self.dmi_rdata = cb(addr);
                    #[cfg(feature = "defmt")]
                    defmt::debug!(
                        "vdtm: dmi_read(addr={:#04x}) -> {:#010x}",
                        addr,
                        self.dmi_rdata
                    );
                }
            }
            _ => {}
        }
    }

    fn refresh_tdo(&mut self) {
        self.tdo = match self.tap_state {
            TapState::ShiftDr | TapState::ShiftIr => (self.shifter & 1) != 0,
            _ => false,
        };
    }
}
