//! Known model layout of the signing meter. Knowing it up front saves the
//! time for scanning the device.

use crate::sunspec::{SunSpecError, SUNSPEC_BASE_ADDRESS, SUNSPEC_HEADER_REGS, SUNSPEC_ID_REGS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInstanceDescriptor {
    pub id: u16,
    pub label: &'static str,
    pub is_snapshot: bool,
    pub aliases: &'static [&'static str],
}

const fn instance(id: u16, label: &'static str, is_snapshot: bool, aliases: &'static [&'static str]) -> ModelInstanceDescriptor {
    return ModelInstanceDescriptor { id, label, is_snapshot, aliases };
}

/// Model instances in device order. The same model id may show up several
/// times, the aliases tell the instances apart.
pub const MODEL_INSTANCES: [ModelInstanceDescriptor; 12] = [
    instance(1,     "Common",                               false, &["common", "cb"]),
    instance(10,    "Serial Interface Header",              false, &["serial_interface_header", "sih"]),
    instance(17,    "Serial Interface",                     false, &["serial_interface", "si"]),
    instance(203,   "AC Meter",                             false, &["ac_meter", "tpm"]),
    instance(64900, "Signing Meter",                        false, &["bs_meter", "bsm", "sm"]),
    instance(64902, "Communication Module Firmware Hash",   false, &["cm_firmware_hash", "cfwh"]),
    instance(64901, "Signed Current Snapshot",              true,  &["signed_current_snapshot", "scs"]),
    instance(64901, "Signed Turn-On Snapshot",              true,  &["signed_turn_on_snapshot", "stons"]),
    instance(64901, "Signed Turn-Off Snapshot",             true,  &["signed_turn_off_snapshot", "stoffs"]),
    instance(64903, "OCMF Signed Current Snapshot",         false, &["ocmf_signed_current_snapshot", "oscs"]),
    instance(64903, "OCMF Signed Turn-On Snapshot",         false, &["ocmf_signed_turn_on_snapshot", "ostons"]),
    instance(64903, "OCMF Signed Turn-Off Snapshot",        false, &["ocmf_signed_turn_off_snapshot", "ostoffs"]),
];

pub const OCMF_TURN_ON_ALIAS: &str = "ocmf_signed_turn_on_snapshot";
pub const OCMF_TURN_OFF_ALIAS: &str = "ocmf_signed_turn_off_snapshot";

pub fn first_model_address() -> u16 {
    /* behind SunS and the header of the first model */
    return SUNSPEC_BASE_ADDRESS + SUNSPEC_ID_REGS + SUNSPEC_HEADER_REGS;
}

/// Data address of the model following one at `address` with `len` registers.
pub fn next_model_address(address: u16, len: u16) -> Result<u16, SunSpecError> {
    return address
        .checked_add(len)
        .and_then(|a| a.checked_add(SUNSPEC_HEADER_REGS))
        .ok_or(SunSpecError::AddressOverflow);
}

/// Index into [`MODEL_INSTANCES`] of the instance known as `alias`.
pub fn instance_index(alias: &str) -> Option<usize> {
    return MODEL_INSTANCES.iter().position(|info| info.aliases.contains(&alias));
}
