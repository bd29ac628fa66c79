// Copyright 2024 RISC-V debug bridge contributors
// Dual licensed under the Apache 2.0 and MIT licenses.

//! SWD packet framing — header bytes, read/write transactions, ACK
//! decoding and TARGETSEL. Builds directly on [`crate::bitio`].

use core::convert::TryFrom;

use crate::bitio::{get_bits, hiz_clocks, put_bits, BitIo};
use num_enum::TryFromPrimitive;

/// Selects an AP or DP register in a header byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ApNdp {
    Dp = 0,
    Ap = 1,
}

/// Read or write direction in a header byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RnW {
    W = 0,
    R = 1,
}

/// The 3-bit SWD acknowledge response, decoded via `num_enum`'s
/// `TryFromPrimitive` rather than a hand-rolled match.
#[derive(Copy, Clone, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Ack {
    Ok = 0b001,
    Wait = 0b010,
    Fault = 0b100,
    Disconnected = 0b111,
}

impl Ack {
    /// Decode the 3-bit ACK field sampled off the wire. Any pattern other
    /// than the four defined here — all other 3-bit combinations are
    /// reserved — decodes to `None`. This core only treats `Ok` as success;
    /// everything else becomes a hard error at the `SwdDmi` layer (no
    /// WAIT/FAULT retry beyond what's documented in that module).
    pub fn decode(bits: u8) -> Option<Ack> {
        Ack::try_from(bits & 0b111).ok()
    }
}

/// DP write address for TARGETSEL — the DP never drives an ACK for this
/// packet, so the caller must clock 5 hi-Z bits in its place.
pub const DP_TARGETSEL: u8 = 0b11;

/// Build the 8-bit SWD header byte: `1 | APnDP | RnW | A[3:2] | parity | 0 | 1`,
/// LSB first. `a` is the 2-bit register-bank address. Parity is the even
/// parity of (APnDP, RnW, A2, A3); folding it in after the fact works
/// because the two fixed framing bits (start, park) always contribute an
/// even number of set bits and can't change the result.
pub const fn header_byte(apndp: ApNdp, rnw: RnW, a: u8) -> u8 {
    let req = 1 | ((apndp as u8) << 1) | ((rnw as u8) << 2) | ((a & 0b11) << 3) | (1 << 7);
    let parity = (req.count_ones() & 1) as u8;
    req | (parity << 5)
}

/// Perform one SWD read transaction: header, turnaround, 3-bit ACK, and (if
/// the caller chooses to decode it) 32 bits of data plus its parity bit,
/// followed by a turnaround. Returns the sampled ACK and, only when it was
/// `Ok`, the 32-bit payload and its parity bit.
pub fn read_transaction(bus: &mut impl BitIo, apndp: ApNdp, a: u8) -> (Ack, Option<(u32, bool)>) {
    put_bits(bus, &[header_byte(apndp, RnW::R, a)], 8);

    hiz_clocks(bus, 1);
    let mut ack_buf = [0u8; 1];
    get_bits(bus, &mut ack_buf, 3);
    let ack = match Ack::decode(ack_buf[0]) {
        Some(ack) => ack,
        None => Ack::Fault,
    };

    if ack != Ack::Ok {
        hiz_clocks(bus, 1);
        return (ack, None);
    }

    let mut data_buf = [0u8; 4];
    get_bits(bus, &mut data_buf, 32);
    let mut parity_buf = [0u8; 1];
    get_bits(bus, &mut parity_buf, 1);
    hiz_clocks(bus, 1);

    let data = u32::from_le_bytes(data_buf);
    let parity = parity_buf[0] & 1 != 0;
    (ack, Some((data, parity)))
}

/// Perform one SWD write transaction: header, turnaround, 3-bit ACK,
/// turnaround, then (only if the ACK was `Ok`) 32 bits of data and its even
/// parity bit.
pub fn write_transaction(bus: &mut impl BitIo, apndp: ApNdp, a: u8, data: u32) -> Ack {
    put_bits(bus, &[header_byte(apndp, RnW::W, a)], 8);

    hiz_clocks(bus, 1);
    let mut ack_buf = [0u8; 1];
    get_bits(bus, &mut ack_buf, 3);
    let ack = match Ack::decode(ack_buf[0]) {
        Some(ack) => ack,
        None => Ack::Fault,
    };
    hiz_clocks(bus, 1);

    if ack != Ack::Ok {
        return ack;
    }

    let parity = (data.count_ones() & 1) as u8;
    put_bits(bus, &data.to_le_bytes(), 32);
    put_bits(bus, &[parity], 1);
    ack
}

/// Issue the TARGETSEL pseudo-write: header for a DP write at
/// `A[3:2] = 0b11`, 5 hi-Z clocks in place of an ACK (no target drives
/// one), then 32 data bits and one even-parity bit.
pub fn targetsel(bus: &mut impl BitIo, value: u32) {
    put_bits(bus, &[header_byte(ApNdp::Dp, RnW::W, DP_TARGETSEL)], 8);
    hiz_clocks(bus, 5);
    put_bits(bus, &value.to_le_bytes(), 32);
    let parity = (value.count_ones() & 1) as u8;
    put_bits(bus, &[parity], 1);
}
