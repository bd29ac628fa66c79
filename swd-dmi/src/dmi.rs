// Copyright 2024 RISC-V debug bridge contributors
// Dual licensed under the Apache 2.0 and MIT licenses.

//! Link bring-up, Mem-AP identification, and the DMI read/write
//! transactions that actually carry [`vdtm::Vdtm`]'s decoded DMI ops across
//! the wire.

use crate::bitio::{put_bits, BitIo};
use crate::error::{Error, Result};
use crate::packet::{read_transaction, targetsel as targetsel_packet, write_transaction, Ack, ApNdp, RnW};

// DP/AP register addresses are the 2-bit A[3:2] field `header_byte` packs
// into the request header — i.e. the byte offset shifted right by 2, not
// the byte offset itself (SELECT picks the bank; A[3:2] picks the register
// within it). ABORT and IDCODE share A[3:2]=0b00 (direction picks which).
const DP_ABORT: u8 = 0b00;
const DP_IDCODE: u8 = 0b00;
const DP_CTRLSTAT: u8 = 0b01;
const DP_SELECT: u8 = 0b10;
const DP_RDBUFF: u8 = 0b11;

// AP registers, all within AP bank 0 once SELECT's AP bank nibble is 0.
const AP_CSW: u8 = 0b00;
const AP_TAR: u8 = 0b01;
const AP_DRW: u8 = 0b11;
// IDR shares A[3:2]=0b11 with DRW; SELECT's AP bank (0xF here) disambiguates.
const AP_IDR: u8 = 0b11;

const ABORT_CLEAR_ALL: u32 = 0x1E;

const CTRLSTAT_CSYSPWRUPREQ: u32 = 1 << 30;
const CTRLSTAT_CDBGPWRUPREQ: u32 = 1 << 28;
const CTRLSTAT_CSYSPWRUPACK: u32 = 1 << 31;
const CTRLSTAT_CDBGPWRUPACK: u32 = 1 << 29;
const CTRLSTAT_ORUNDETECT: u32 = 1 << 0;

const MEM_AP_APB_IDR_MASK: u32 = 0x1E00F;
const MEM_AP_APB_IDR_VALUE: u32 = 0x10002;

const PWRUP_ACK_TIMEOUT: u32 = 10000;

/// The fixed link-down-up byte sequence from the normative preamble: 52
/// bytes clocked out, with only the low 4 bits of the final byte used (412
/// bits total).
const LINE_RESET_BYTES: [u8; 52] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xBC, 0xE3, 0xFF, 0x92, 0xF3, 0x09, 0x62, 0x95, 0x2D,
    0x85, 0x86, 0xE9, 0xAF, 0xDD, 0xE3, 0xA2, 0x0E, 0xBC, 0x19, 0xA0, 0x01, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0x03, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF,
];
const LINE_RESET_BITS: usize = 412;

/// An SWD-backed carrier for RISC-V DMI accesses, addressing a single Mem-AP
/// behind an SW-DP.
///
/// Parameterised over the bit-banged bus so the same logic drives any board
/// that implements [`BitIo`]; construction never touches the wire, only
/// [`connect`] does.
///
/// [`connect`]: SwdDmi::connect
pub struct SwdDmi<B: BitIo> {
    bus: B,
    targetsel: u32,
    apsel: u8,
    tar_cache: Option<u32>,
    /// Bounded retry count for transient WAIT acks during steady-state DMI
    /// accesses after connect (see crate docs — not part of the original
    /// connect protocol, which never retries).
    wait_retries: u8,
    /// When set, a read's parity bit is checked and a mismatch surfaces
    /// `Error::BadParity` instead of being silently discarded.
    check_parity: bool,
}

impl<B: BitIo> SwdDmi<B> {
    /// Construct a carrier for the given bus. `targetsel` of 0 means no
    /// TARGETSEL is issued during connect; `apsel` selects which AP index
    /// (0-255) is expected to be the target Mem-AP.
    pub fn new(bus: B, targetsel: u32, apsel: u8) -> Self {
        SwdDmi {
            bus,
            targetsel,
            apsel,
            tar_cache: None,
            wait_retries: 8,
            check_parity: false,
        }
    }

    /// Override the bounded WAIT-retry budget for steady-state DMI
    /// transactions (default 8).
    pub fn set_wait_retries(&mut self, n: u8) {
        self.wait_retries = n;
    }

    /// Enable or disable checking the read parity bit (default disabled,
    /// matching ORUNDETECT mode).
    pub fn set_check_parity(&mut self, check: bool) {
        self.check_parity = check;
    }

    /// Access the underlying bus. Crate-internal only — exists so tests
    /// outside this module can inspect what actually got driven on the
    /// wire, the same way this module's own tests read `dmi.bus` directly.
    pub(crate) fn bus(&self) -> &B {
        &self.bus
    }

    /// Run the full connect sequence: line reset, optional TARGETSEL, DPIDR
    /// read, ABORT clear, power-up request and poll, and Mem-AP
    /// identification. Idempotent — safe to call again after a failure.
    pub fn connect(&mut self) -> Result<()> {
        self.tar_cache = None;

        put_bits(&mut self.bus, &LINE_RESET_BYTES, LINE_RESET_BITS);

        if self.targetsel != 0 {
            targetsel_packet(&mut self.bus, self.targetsel);
        }

        self.dp_read_raw(DP_IDCODE)?;
        self.dp_write_raw(DP_ABORT, ABORT_CLEAR_ALL)?;
        self.dp_write_raw(DP_SELECT, 0)?;
        self.dp_write_raw(
            DP_CTRLSTAT,
            CTRLSTAT_CSYSPWRUPREQ | CTRLSTAT_CDBGPWRUPREQ | CTRLSTAT_ORUNDETECT,
        )?;

        let mut last_ctrlstat = 0u32;
        let powered = (0..PWRUP_ACK_TIMEOUT).any(|_| {
            last_ctrlstat = match self.dp_read_raw(DP_CTRLSTAT) {
                Ok(v) => v,
                Err(_) => return false,
            };
            (last_ctrlstat & (CTRLSTAT_CSYSPWRUPACK | CTRLSTAT_CDBGPWRUPACK))
                == (CTRLSTAT_CSYSPWRUPACK | CTRLSTAT_CDBGPWRUPACK)
        });
        if !powered {
            return Err(Error::PowerupTimeout { last_ctrlstat });
        }

        self.dp_write_raw(DP_SELECT, ap_select_value(0xF, self.apsel))?;
        self.ap_read_raw(AP_IDR)?;
        let idr = self.dp_read_raw(DP_RDBUFF)?;
        if (idr & MEM_AP_APB_IDR_MASK) != MEM_AP_APB_IDR_VALUE {
            return Err(Error::WrongAp { idr });
        }

        self.dp_write_raw(DP_SELECT, ap_select_value(0x0, self.apsel))?;
        Ok(())
    }

    /// Read one 32-bit DMI register, scaling the word address by 4 to reach
    /// the Mem-AP's byte-addressed TAR.
    pub fn dmi_read(&mut self, addr: u8) -> Result<u32> {
        let byte_addr = (addr as u32) << 2;
        self.ensure_tar(byte_addr)?;
        self.ap_read(AP_DRW)?;
        self.dp_read(DP_RDBUFF)
    }

    /// Write one 32-bit DMI register.
    pub fn dmi_write(&mut self, addr: u8, data: u32) -> Result<()> {
        let byte_addr = (addr as u32) << 2;
        self.ensure_tar(byte_addr)?;
        self.ap_write(AP_DRW, data)
    }

    fn ensure_tar(&mut self, byte_addr: u32) -> Result<()> {
        if self.tar_cache == Some(byte_addr) {
            return Ok(());
        }
        self.ap_write(AP_TAR, byte_addr)?;
        self.tar_cache = Some(byte_addr);
        Ok(())
    }

    fn dp_read(&mut self, a: u8) -> Result<u32> {
        self.transact(ApNdp::Dp, RnW::R, a, 0).map(|v| v.unwrap_or(0))
    }

    fn dp_write(&mut self, a: u8, data: u32) -> Result<()> {
        self.transact(ApNdp::Dp, RnW::W, a, data).map(|_| ())
    }

    fn ap_read(&mut self, a: u8) -> Result<u32> {
        self.transact(ApNdp::Ap, RnW::R, a, 0).map(|v| v.unwrap_or(0))
    }

    fn ap_write(&mut self, a: u8, data: u32) -> Result<()> {
        self.transact(ApNdp::Ap, RnW::W, a, data).map(|_| ())
    }

    /// Bring-up variants of the above that bypass the WAIT-retry loop — at
    /// this point in connect the AP bank hasn't settled yet, so a retry
    /// that re-reads SELECT state would be meaningless. They still treat
    /// any non-OK ACK as a hard failure, matching the original connect
    /// protocol which never retries.
    fn dp_read_raw(&mut self, a: u8) -> Result<u32> {
        let (ack, payload) = read_transaction(&mut self.bus, ApNdp::Dp, a);
        self.check_ack(ack)?;
        let (data, parity) = payload.unwrap_or((0, false));
        self.check_parity(data, parity)?;
        Ok(data)
    }

    fn dp_write_raw(&mut self, a: u8, data: u32) -> Result<()> {
        let ack = write_transaction(&mut self.bus, ApNdp::Dp, a, data);
        self.check_ack(ack)
    }

    fn ap_read_raw(&mut self, a: u8) -> Result<u32> {
        let (ack, payload) = read_transaction(&mut self.bus, ApNdp::Ap, a);
        self.check_ack(ack)?;
        let (data, parity) = payload.unwrap_or((0, false));
        self.check_parity(data, parity)?;
        Ok(data)
    }

    /// Steady-state DMI transaction with the bounded WAIT retry and
    /// single-shot FAULT recovery described in the crate docs: a FAULT gets
    /// one ABORT write (clearing only the sticky error flags, leaving
    /// SELECT's AP bank untouched) and one retry of the same transaction;
    /// a WAIT gets retried up to `wait_retries` times with no recovery
    /// action (the target is expected to simply become ready).
    fn transact(&mut self, apndp: ApNdp, rnw: RnW, a: u8, data: u32) -> Result<Option<u32>> {
        let mut faulted_once = false;
        for _ in 0..=self.wait_retries {
            let (ack, payload) = match rnw {
                RnW::R => {
                    let (ack, payload) = read_transaction(&mut self.bus, apndp, a);
                    (ack, payload)
                }
                RnW::W => (write_transaction(&mut self.bus, apndp, a, data), None),
            };

            match ack {
                Ack::Ok => {
                    return match payload {
                        Some((value, parity)) => {
                            self.check_parity(value, parity)?;
                            Ok(Some(value))
                        }
                        None => Ok(None),
                    }
                }
                Ack::Wait => continue,
                Ack::Fault if !faulted_once => {
                    faulted_once = true;
                    self.dp_write_raw(DP_ABORT, ABORT_CLEAR_ALL)?;
                    continue;
                }
                other => return Err(Error::Ack(other)),
            }
        }
        Err(Error::Ack(Ack::Wait))
    }

    fn check_ack(&self, ack: Ack) -> Result<()> {
        match ack {
            Ack::Ok => Ok(()),
            other => Err(Error::Ack(other)),
        }
    }

    fn check_parity(&self, data: u32, parity: bool) -> Result<()> {
        if self.check_parity && (data.count_ones() & 1 != 0) != parity {
            return Err(Error::BadParity);
        }
        Ok(())
    }
}

const fn ap_select_value(bank: u8, apsel: u8) -> u32 {
    ((apsel as u32) << 24) | ((bank as u32) << 4)
}
