use log::debug;

use super::definitions::ModelLibrary;
use super::model::Model;
use super::transport::Transport;
use super::types::{Access, PointValue, TextEncoding};
use super::{SunSpecError, REQ_COUNT_MAX, SUNSPEC_HEADER_REGS, WRITE_COUNT_MAX};

/// Typed reference to a model registered with a [`Device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelHandle(usize);

impl ModelHandle {
    pub fn index(&self) -> usize {
        return self.0;
    }
}

/// A device owning its transport and all model instances added to it.
pub struct Device<T: Transport> {
    transport: T,
    library: ModelLibrary,
    encoding: TextEncoding,
    max_count: u16,
    models: Vec<Model>,
}

impl<T: Transport> Device<T> {
    pub fn new(transport: T, library: ModelLibrary, encoding: TextEncoding) -> Self {
        return Device {
            transport,
            library,
            encoding,
            max_count: REQ_COUNT_MAX,
            models: Vec::new(),
        };
    }

    pub fn with_max_count(mut self, max_count: u16) -> Self {
        self.max_count = max_count.clamp(1, REQ_COUNT_MAX);
        return self;
    }

    pub fn encoding(&self) -> TextEncoding {
        return self.encoding;
    }

    pub fn library(&self) -> &ModelLibrary {
        return &self.library;
    }

    pub fn transport(&self) -> &T {
        return &self.transport;
    }

    pub fn transport_mut(&mut self) -> &mut T {
        return &mut self.transport;
    }

    pub fn models(&self) -> &[Model] {
        return &self.models;
    }

    pub fn model(&self, handle: ModelHandle) -> &Model {
        return &self.models[handle.0];
    }

    /// Instantiates model `id` whose data starts at `address`. The header in
    /// front of it is checked against `id`; a `len` of zero takes the length
    /// from the header.
    pub fn load_model(&mut self, id: u16, address: u16, len: u16) -> Result<Model, SunSpecError> {
        let definition = self.library.get(id).ok_or(SunSpecError::UnknownModel(id))?;
        let header_address = address.checked_sub(SUNSPEC_HEADER_REGS).ok_or(SunSpecError::AddressOverflow)?;
        let header = self.read(header_address, SUNSPEC_HEADER_REGS)?;

        if header[0] != id {
            return Err(SunSpecError::ModelIdMismatch { address: header_address, expected: id, found: header[0] });
        }

        let len = match len {
            0 => header[1],
            _ => len,
        };

        debug!("Loaded model {} at {} with {} registers", id, address, len);
        return Model::new(definition, address, len);
    }

    pub fn add_model(&mut self, model: Model) -> ModelHandle {
        self.models.push(model);
        return ModelHandle(self.models.len() - 1);
    }

    /// Reads `count` registers, split into as many requests as needed.
    pub fn read(&mut self, address: u16, count: u16) -> Result<Vec<u16>, SunSpecError> {
        let mut result = Vec::with_capacity(count as usize);
        let mut offset: u16 = 0;

        while offset < count {
            let chunk = std::cmp::min(self.max_count, count - offset);
            let start = address.checked_add(offset).ok_or(SunSpecError::AddressOverflow)?;
            let data = self.transport.read_registers(start, chunk)?;
            if data.len() != chunk as usize {
                return Err(SunSpecError::ShortRead { address: start, expected: chunk as usize, actual: data.len() });
            }
            result.extend_from_slice(&data);
            offset += chunk;
        }

        return Ok(result);
    }

    pub fn write(&mut self, address: u16, values: &[u16]) -> Result<(), SunSpecError> {
        /* FC16 carries less than FC3 */
        let max = std::cmp::min(self.max_count, WRITE_COUNT_MAX) as usize;
        let mut start = address;

        for chunk in values.chunks(max) {
            self.transport.write_registers(start, chunk)?;
            start = start.wrapping_add(chunk.len() as u16);
        }

        return Ok(());
    }

    pub fn read_points(&mut self, handle: ModelHandle) -> Result<(), SunSpecError> {
        // copy out, the model is borrowed mutably below
        let (address, len) = {
            let model = &self.models[handle.0];
            (model.base_address(), model.len())
        };

        let regs = self.read(address, len)?;
        let encoding = self.encoding;
        self.models[handle.0].load_registers(&regs, encoding)?;
        debug!("Read model {} at {}", self.models[handle.0].id(), address);

        return Ok(());
    }

    /// Writes a value to a fixed block point and keeps it as the point's
    /// current value once the device accepted it.
    pub fn write_point(&mut self, handle: ModelHandle, id: &str, value: PointValue) -> Result<(), SunSpecError> {
        let encoding = self.encoding;
        let model = &self.models[handle.0];
        let point = model.point(id).ok_or_else(|| SunSpecError::UnknownPoint {
            model: model.id(),
            point: id.to_string(),
        })?;

        if point.definition().access != Access::Rw {
            return Err(SunSpecError::ReadOnly(id.to_string()));
        }

        let regs = point.point_type().encode(Some(&value), point.len(), encoding)?;
        let address = point.address();
        self.write(address, &regs)?;

        if let Some(point) = self.models[handle.0].point_mut(id) {
            point.set_value(Some(value));
        }

        return Ok(());
    }
}
