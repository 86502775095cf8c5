use std::sync::Arc;

use super::definitions::{ModelDefinition, PointDefinition};
use super::types::{PointType, PointValue, TextEncoding};
use super::SunSpecError;

/// A single data point bound to its register address.
#[derive(Debug, Clone)]
pub struct Point {
    definition: PointDefinition,
    address: u16,
    value: Option<PointValue>,
}

impl Point {
    fn new(definition: PointDefinition, address: u16) -> Self {
        return Point { definition, address, value: None };
    }

    pub fn id(&self) -> &str {
        return &self.definition.id;
    }

    pub fn definition(&self) -> &PointDefinition {
        return &self.definition;
    }

    pub fn point_type(&self) -> PointType {
        return self.definition.point_type;
    }

    pub fn address(&self) -> u16 {
        return self.address;
    }

    pub fn len(&self) -> u16 {
        return self.definition.register_count();
    }

    pub fn is_empty(&self) -> bool {
        return self.len() == 0;
    }

    /// Last value read from (or written to) the device. `None` if the device
    /// reported the unimplemented sentinel or nothing has been read yet.
    pub fn value(&self) -> Option<&PointValue> {
        return self.value.as_ref();
    }

    pub(crate) fn set_value(&mut self, value: Option<PointValue>) {
        self.value = value;
    }

    pub fn registers(&self, encoding: TextEncoding) -> Result<Vec<u16>, SunSpecError> {
        return self.point_type().encode(self.value.as_ref(), self.len(), encoding);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Fixed,
    Repeating,
}

#[derive(Debug, Clone)]
pub struct Block {
    kind: BlockKind,
    index: usize,
    address: u16,
    len: u16,
    points: Vec<Point>,
}

impl Block {
    fn new(kind: BlockKind, index: usize, address: u16, definitions: &[PointDefinition]) -> Result<Self, SunSpecError> {
        let mut points = Vec::with_capacity(definitions.len());
        let mut offset: u32 = address as u32;

        for definition in definitions {
            let point_address = u16::try_from(offset).map_err(|_| SunSpecError::AddressOverflow)?;
            offset += definition.register_count() as u32;
            points.push(Point::new(definition.clone(), point_address));
        }

        return Ok(Block {
            kind,
            index,
            address,
            len: (offset - address as u32) as u16,
            points,
        });
    }

    pub fn kind(&self) -> BlockKind {
        return self.kind;
    }

    pub fn index(&self) -> usize {
        return self.index;
    }

    pub fn address(&self) -> u16 {
        return self.address;
    }

    pub fn len(&self) -> u16 {
        return self.len;
    }

    pub fn is_empty(&self) -> bool {
        return self.points.is_empty();
    }

    pub fn points(&self) -> &[Point] {
        return &self.points;
    }

    pub fn point(&self, id: &str) -> Option<&Point> {
        return self.points.iter().find(|p| p.id() == id);
    }
}

/// A model instance at a fixed address. Block 0 is the fixed block, every
/// following block is a repeating one.
#[derive(Debug, Clone)]
pub struct Model {
    base_address: u16,
    len: u16,
    definition: Arc<ModelDefinition>,
    blocks: Vec<Block>,
}

impl Model {
    /// Lays out the blocks for a model of `len` registers starting at
    /// `base_address` (the first register after the model header).
    pub fn new(definition: Arc<ModelDefinition>, base_address: u16, len: u16) -> Result<Self, SunSpecError> {
        let fixed_len = definition.fixed_len();
        let repeating_len = definition.repeating_len();
        let length_error = SunSpecError::ModelLength { id: definition.id, len };

        if len < fixed_len {
            return Err(length_error);
        }

        let repeating_count = match repeating_len {
            0 => 0,
            _ => {
                let remaining = len - fixed_len;
                if remaining % repeating_len != 0 {
                    return Err(length_error);
                }
                remaining / repeating_len
            }
        };

        /* the last register may be 0xFFFF, not beyond */
        if base_address as u32 + len as u32 > u16::MAX as u32 + 1 {
            return Err(SunSpecError::AddressOverflow);
        }

        let mut blocks = Vec::with_capacity(1 + repeating_count as usize);
        blocks.push(Block::new(BlockKind::Fixed, 0, base_address, &definition.fixed)?);

        let mut address = base_address as u32 + fixed_len as u32;
        for index in 1..=repeating_count as usize {
            let block_address = u16::try_from(address).map_err(|_| SunSpecError::AddressOverflow)?;
            blocks.push(Block::new(BlockKind::Repeating, index, block_address, &definition.repeating)?);
            address += repeating_len as u32;
        }

        return Ok(Model { base_address, len, definition, blocks });
    }

    pub fn id(&self) -> u16 {
        return self.definition.id;
    }

    pub fn base_address(&self) -> u16 {
        return self.base_address;
    }

    pub fn len(&self) -> u16 {
        return self.len;
    }

    pub fn is_empty(&self) -> bool {
        return self.len == 0;
    }

    pub fn definition(&self) -> &ModelDefinition {
        return &self.definition;
    }

    pub fn blocks(&self) -> &[Block] {
        return &self.blocks;
    }

    pub fn point(&self, id: &str) -> Option<&Point> {
        /* fixed block only, repeating blocks share point ids */
        return self.blocks.first().and_then(|b| b.point(id));
    }

    pub(crate) fn point_mut(&mut self, id: &str) -> Option<&mut Point> {
        return self.blocks.first_mut().and_then(|b| b.points.iter_mut().find(|p| p.id() == id));
    }

    pub fn value(&self, id: &str) -> Option<&PointValue> {
        return self.point(id).and_then(|p| p.value());
    }

    /// Value of a fixed block point with its scale factor applied.
    pub fn scaled_value(&self, id: &str) -> Option<f64> {
        let point = self.point(id)?;
        let value = point.value()?.as_f64()?;

        return match &point.definition().sf {
            None => Some(value),
            Some(sf) => {
                let sf = self.value(sf)?.as_i64()? as i32;
                // divide for negative factors, 10^-n is not exact
                if sf < 0 {
                    Some(value / 10f64.powi(-sf))
                } else {
                    Some(value * 10f64.powi(sf))
                }
            }
        };
    }

    pub(crate) fn load_registers(&mut self, regs: &[u16], encoding: TextEncoding) -> Result<(), SunSpecError> {
        if regs.len() < self.len as usize {
            return Err(SunSpecError::ShortRead {
                address: self.base_address,
                expected: self.len as usize,
                actual: regs.len(),
            });
        }

        let base = self.base_address as usize;
        for block in self.blocks.iter_mut() {
            for point in block.points.iter_mut() {
                let start = point.address as usize - base;
                let end = start + point.len() as usize;
                let value = point.point_type().decode(&regs[start..end], encoding)?;
                point.value = value;
            }
        }

        return Ok(());
    }
}
