// Copyright 2024 RISC-V debug bridge contributors
// Dual licensed under the Apache 2.0 and MIT licenses.

//! An SWD-backed carrier for the RISC-V Debug Module Interface: drives an
//! ARM SW-DP/Mem-AP pair over a bit-banged two-wire bus to reach the target's
//! Debug Module, the same DMI accesses [`vdtm::Vdtm`] decodes out of a JTAG
//! bit stream on the host side of the bridge.
//!
//! This crate has no compile-time dependency on `vdtm`'s types — the two
//! crates communicate only through the two DMI upcalls `vdtm` exposes
//! ([`vdtm::Vdtm::bind_dmi_write`], [`vdtm::Vdtm::bind_dmi_read`]) — but it
//! depends on the crate anyway so its own docs and integration tests can
//! show a complete, wired-together bridge rather than `swd-dmi` in
//! isolation. See the `bridge` integration test for the closures that
//! actually close the loop; that glue code, not either crate's public API,
//! is what an application would write.

#![cfg_attr(not(test), no_std)]

mod bitio;
mod dmi;
mod error;
mod packet;

pub use bitio::BitIo;
pub use dmi::SwdDmi;
pub use error::{Error, Result};
pub use packet::{Ack, ApNdp, RnW};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitio::mock::MockBus;

    /// Demonstrates the glue layer described in the crate docs: a closure
    /// capturing `&mut SwdDmi` is handed to `Vdtm::bind_dmi_write`/
    /// `bind_dmi_read`, and a JTAG-side DMI access drives all the way
    /// through to an SWD transaction. Uses the raw `MockBus` bit-script
    /// rather than the behavioral `MockTarget` in `dmi`'s own tests, since
    /// here we only care that the upcall reaches `dmi_write` at all, not
    /// that a full connect handshake succeeds.
    #[test]
    fn vdtm_dmi_write_upcall_reaches_swd_dmi_write_transaction() {
        // Scripts a single successful AP TAR write followed by a single
        // successful AP DRW write, each just an OK ack with no payload.
        let mut rx = std::vec::Vec::new();
        rx.extend([false, false, true]); // ack = 0b001 = Ok (TAR write)
        rx.extend([false, false, true]); // ack = 0b001 = Ok (DRW write)
        let bus = MockBus::new(rx);
        let mut swd = SwdDmi::new(bus, 0, 0);

        let mut write_upcall = |addr: u8, data: u32| {
            swd.dmi_write(addr, data).ok();
        };

        let mut vdtm = vdtm::Vdtm::new(0);
        vdtm.bind_dmi_write(&mut write_upcall);

        drive_dmi_write(&mut vdtm, 0x10, 0x0000_0001);

        // The upcall must have reached `dmi_write`, which first writes TAR
        // (byte address = DMI address << 2) and then DRW (the data word).
        // Each write_transaction drives an 8-bit header, 32 data bits and a
        // parity bit; decode both transactions' data fields off the wire.
        let driven = &swd.bus().driven_bits;
        assert_eq!(driven.len(), 2 * (8 + 32 + 1));
        let data_word = |bits: &[bool]| -> u32 {
            let mut v = 0u32;
            for (i, &b) in bits.iter().enumerate() {
                if b {
                    v |= 1 << i;
                }
            }
            v
        };
        let tar_write = data_word(&driven[8..40]);
        let drw_write = data_word(&driven[8 + 41..40 + 41]);
        assert_eq!(tar_write, 0x10u32 << 2);
        assert_eq!(drw_write, 0x0000_0001);
    }

    fn drive_dmi_write(v: &mut vdtm::Vdtm, addr: u8, data: u32) {
        let bits = |value: u64, n: u32| -> std::vec::Vec<bool> {
            (0..n).map(|i| (value >> i) & 1 != 0).collect()
        };
        let drive_tms = |v: &mut vdtm::Vdtm, tms_bits: &[bool]| {
            for &tms in tms_bits {
                v.set_tms(tms);
                v.set_tck(true);
                v.set_tck(false);
            }
        };
        // Shift `bits`, combining the final bit with the TMS=1 edge that
        // leaves Shift-IR/DR, then drive Exit1 -> Update -> Idle so the
        // decoded value actually takes effect (see `vdtm`'s own
        // `shift_and_update` test helper for why the last bit can't be
        // shifted separately from the exit edge).
        let shift_and_update = |v: &mut vdtm::Vdtm, bits: &[bool]| {
            let (&last, head) = bits.split_last().expect("non-empty scan");
            for &tdi in head {
                v.set_tdi(tdi);
                v.set_tms(false);
                v.set_tck(true);
                v.set_tck(false);
            }
            v.set_tdi(last);
            v.set_tms(true); // combined final shift + Shift -> Exit1
            v.set_tck(true);
            v.set_tck(false);
            v.set_tms(true); // Exit1 -> Update
            v.set_tck(true);
            v.set_tck(false);
            v.set_tms(false); // Update -> Idle; the update action fires here
            v.set_tck(true);
            v.set_tck(false);
        };

        drive_tms(v, &[true, true, true, true, true]); // -> reset
        drive_tms(v, &[false]); // -> idle
        drive_tms(v, &[true, true, false, false]); // -> shift-ir
        shift_and_update(v, &bits(vdtm::IR_DMI as u64, vdtm::W_IR));

        drive_tms(v, &[false]); // -> idle
        drive_tms(v, &[true, false, false]); // -> shift-dr
        let payload = ((addr as u64) << 34) | ((data as u64) << 2) | 2;
        shift_and_update(v, &bits(payload, vdtm::W_DMI));
    }
}
