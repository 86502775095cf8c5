//! Binary data carried in repeating blocks.
//!
//! SunSpec has no BLOB type. The signing meter exports keys, signatures and
//! hashes as a run of repeating blocks holding a single `uint16` each. These
//! functions work on already read models, they never touch the device.

use crate::sunspec::types::bytes_to_registers;
use crate::sunspec::{Model, Point, PointType, PointValue};

/// Returns whether the repeating blocks of `model` are likely to contain a
/// BLOB.
///
/// This is a heuristic on the block shape: a model qualifies if it has at
/// least one repeating block and the first one holds a single `uint16` point
/// without units and without scale factor.
pub fn has_blob_layout(model: &Model) -> bool {
    let blocks = model.blocks();
    if blocks.len() <= 1 {
        return false;
    }

    let points = blocks[1].points();
    if points.len() != 1 {
        return false;
    }

    let definition = points[0].definition();
    return definition.point_type == PointType::Uint16
        && definition.units.is_none()
        && definition.sf.is_none();
}

/* An unimplemented 0xffff collapses to no value during decoding. For BLOB data
 * we want the real bits back. */
fn blob_point_bytes(point: &Point) -> [u8; 2] {
    let raw = point
        .value()
        .and_then(PointValue::as_i64)
        .map(|v| v as u16)
        .unwrap_or(point.point_type().unimplemented() as u16);

    return raw.to_be_bytes();
}

/// Collects the BLOB from the repeating blocks of `model`, in block order.
/// `None` if the model has no BLOB layout.
pub fn blob(model: &Model) -> Option<Vec<u8>> {
    if !has_blob_layout(model) {
        return None;
    }

    let data = model.blocks()[1..]
        .iter()
        .filter_map(|block| block.points().first())
        .flat_map(blob_point_bytes)
        .collect();

    return Some(data);
}

pub fn blob_point_id(model: &Model) -> Option<&str> {
    if !has_blob_layout(model) {
        return None;
    }

    return model.blocks()[1].points().first().map(|p| p.id());
}

pub fn blob_registers(data: &[u8]) -> Vec<u16> {
    return bytes_to_registers(data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sunspec::{ModelDefinition, TextEncoding};
    use std::sync::Arc;

    const FIXED: &str = "id: 64999\nname: test\nfixed:\n  - { id: N, type: uint16 }\n";

    fn model(repeating: &str, repeats: u16) -> Model {
        let yaml = format!("{FIXED}repeating:\n{repeating}");
        let definition = Arc::new(ModelDefinition::from_yaml(&yaml).unwrap());
        let len = definition.fixed_len() + repeats * definition.repeating_len();
        return Model::new(definition, 100, len).unwrap();
    }

    fn blob_model(data: &[u8]) -> Model {
        let regs = blob_registers(data);
        let mut model = model("  - { id: D, type: uint16 }\n", regs.len() as u16);
        let mut all = vec![regs.len() as u16];
        all.extend_from_slice(&regs);
        model.load_registers(&all, TextEncoding::Utf8).unwrap();
        return model;
    }

    #[test]
    fn test_detects_blob_layout() {
        let m = model("  - { id: D, type: uint16 }\n", 3);
        assert!(has_blob_layout(&m));
        assert_eq!(blob_point_id(&m), Some("D"));
    }

    #[test]
    fn test_rejects_other_shapes() {
        /* no repeating block instance */
        assert!(!has_blob_layout(&model("  - { id: D, type: uint16 }\n", 0)));
        /* two points per block */
        assert!(!has_blob_layout(&model("  - { id: D, type: uint16 }\n  - { id: E, type: uint16 }\n", 2)));
        /* other types */
        assert!(!has_blob_layout(&model("  - { id: D, type: int16 }\n", 2)));
        assert!(!has_blob_layout(&model("  - { id: D, type: uint32 }\n", 2)));
        /* units or scale factor make it a measurement */
        assert!(!has_blob_layout(&model("  - { id: D, type: uint16, units: W }\n", 2)));
        assert!(!has_blob_layout(&model("  - { id: D, type: uint16, sf: N }\n", 2)));

        let plain = model("  - { id: D, type: int16 }\n", 2);
        assert_eq!(blob(&plain), None);
        assert_eq!(blob_point_id(&plain), None);
    }

    #[test]
    fn test_reconstructs_in_block_order() {
        assert_eq!(blob(&blob_model(&[])), None);

        let one = blob_model(&[0xAB, 0xCD]);
        assert_eq!(blob(&one), Some(vec![0xAB, 0xCD]));

        let data: Vec<u8> = (0..64u8).map(|i| i.wrapping_mul(37)).collect();
        assert_eq!(blob(&blob_model(&data)), Some(data));
    }

    #[test]
    fn test_unimplemented_words_keep_their_bits() {
        let model = blob_model(&[0x01, 0x02, 0xFF, 0xFF, 0x03, 0x04]);
        assert_eq!(model.blocks()[2].points()[0].value(), None);
        assert_eq!(blob(&model), Some(vec![0x01, 0x02, 0xFF, 0xFF, 0x03, 0x04]));
    }
}
