// Copyright 2024 RISC-V debug bridge contributors
// Dual licensed under the Apache 2.0 and MIT licenses.

use crate::packet::Ack;

/// Failure modes surfaced by the SWD packet layer and the DMI connect
/// protocol. `no_std`, so no `std::error::Error` impl — matches the
/// teacher's own bare `swd::Error`.
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A transaction's ACK was not OK after any configured retries.
    Ack(Ack),
    /// The power-up poll (DP CTRL/STAT CSYSPWRUPACK & CDBGPWRUPACK) did not
    /// assert within the bounded number of reads. Carries the last CTRL/STAT
    /// value observed so a caller can tell an orphaned request from a dead
    /// link.
    PowerupTimeout { last_ctrlstat: u32 },
    /// The AP behind the selected `apsel` is not a Mem-AP APB2/APB3 (its IDR
    /// didn't match `(idr & 0x1E00F) == 0x10002`).
    WrongAp { idr: u32 },
    /// Read parity mismatch. Only reachable when `check_parity` is enabled;
    /// by default (matching ORUNDETECT mode) the parity bit is discarded.
    BadParity,
}

pub type Result<T> = core::result::Result<T, Error>;
