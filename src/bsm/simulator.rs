//! In-memory signing meter for tests. Registers are laid out like a real
//! device following the registry, status registers can be scripted.

use std::collections::{BTreeMap, HashMap, VecDeque};

use super::blob::blob_registers;
use super::registry::{self, MODEL_INSTANCES};
use crate::sunspec::{ModelLibrary, PointValue, SunSpecError, TextEncoding, Transport, SUNSPEC_BASE_ADDRESS, SUNSPEC_ID};

pub(crate) struct SimulatedMeter {
    regs: BTreeMap<u16, u16>,
    library: ModelLibrary,
    encoding: TextEncoding,
    /* data address and length per registry instance */
    layout: Vec<(u16, u16)>,
    scripts: HashMap<u16, VecDeque<u16>>,
    pub writes: Vec<(u16, Vec<u16>)>,
}

impl SimulatedMeter {
    /// A meter with a public key of `pk_regs` and signatures of `sig_regs`
    /// registers. All other models come with their fixed block only.
    pub fn new(pk_regs: u16, sig_regs: u16) -> Self {
        let library = ModelLibrary::builtin().unwrap();
        let mut regs = BTreeMap::new();
        regs.insert(SUNSPEC_BASE_ADDRESS, SUNSPEC_ID[0]);
        regs.insert(SUNSPEC_BASE_ADDRESS + 1, SUNSPEC_ID[1]);

        let mut layout = Vec::new();
        let mut address = registry::first_model_address();
        for info in MODEL_INSTANCES.iter() {
            let definition = library.get(info.id).unwrap();
            let repeats = match info.id {
                64900 => pk_regs,
                64901 => sig_regs,
                _ => 0,
            };
            let len = definition.fixed_len() + repeats * definition.repeating_len();
            regs.insert(address - 2, info.id);
            regs.insert(address - 1, len);
            layout.push((address, len));
            address = registry::next_model_address(address, len).unwrap();
        }
        regs.insert(address - 2, 0xFFFF);
        regs.insert(address - 1, 0);

        let mut meter = SimulatedMeter {
            regs,
            library,
            encoding: TextEncoding::Utf8,
            layout,
            scripts: HashMap::new(),
            writes: Vec::new(),
        };

        meter.set_point("bsm", "NPK", PointValue::Integer(pk_regs as i64));
        meter.set_point("bsm", "Curve", "secp256r1".into());
        for alias in ["scs", "stons", "stoffs"] {
            meter.set_point(alias, "NSig", PointValue::Integer(sig_regs as i64));
        }
        return meter;
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        return self;
    }

    pub fn register(&self, address: u16) -> u16 {
        return *self.regs.get(&address).unwrap_or(&0);
    }

    pub fn set_register(&mut self, address: u16, value: u16) {
        self.regs.insert(address, value);
    }

    fn instance(&self, alias: &str) -> (u16, u16, u16) {
        let index = registry::instance_index(alias).unwrap();
        let (address, len) = self.layout[index];
        return (MODEL_INSTANCES[index].id, address, len);
    }

    pub fn instance_address(&self, alias: &str) -> u16 {
        return self.instance(alias).1;
    }

    pub fn point_address(&self, alias: &str, id: &str) -> u16 {
        let (model_id, address, _) = self.instance(alias);
        let definition = self.library.get(model_id).unwrap();
        let mut offset = address;
        for point in definition.fixed.iter() {
            if point.id == id {
                return offset;
            }
            offset += point.register_count();
        }
        panic!("no point {id} in {alias}");
    }

    pub fn set_point(&mut self, alias: &str, id: &str, value: PointValue) {
        let (model_id, _, _) = self.instance(alias);
        let definition = self.library.get(model_id).unwrap();
        let point = definition.point(id).unwrap();
        let regs = point.point_type.encode(Some(&value), point.register_count(), self.encoding).unwrap();
        let address = self.point_address(alias, id);
        for (i, r) in regs.into_iter().enumerate() {
            self.regs.insert(address + i as u16, r);
        }
    }

    /// Fills the repeating blocks of `alias` with `data`.
    pub fn set_blob(&mut self, alias: &str, data: &[u8]) {
        let (model_id, address, len) = self.instance(alias);
        let fixed_len = self.library.get(model_id).unwrap().fixed_len();
        let regs = blob_registers(data);
        assert_eq!(regs.len(), (len - fixed_len) as usize, "BLOB does not fill {alias}");
        for (i, r) in regs.into_iter().enumerate() {
            self.regs.insert(address + fixed_len + i as u16, r);
        }
    }

    /// Values the status point of `alias` reports on the following reads. The
    /// last one sticks.
    pub fn script_status(&mut self, alias: &str, values: &[u16]) {
        let address = self.point_address(alias, "St");
        self.scripts.insert(address, values.iter().copied().collect());
    }
}

impl Transport for SimulatedMeter {
    fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>, SunSpecError> {
        let end = address as u32 + count as u32;
        for (script_address, values) in self.scripts.iter_mut() {
            if (*script_address as u32) >= address as u32 && (*script_address as u32) < end {
                if let Some(value) = values.pop_front() {
                    self.regs.insert(*script_address, value);
                }
            }
        }

        return Ok((0..count).map(|i| self.register(address.wrapping_add(i))).collect());
    }

    fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<(), SunSpecError> {
        self.writes.push((address, values.to_vec()));
        for (i, v) in values.iter().enumerate() {
            self.regs.insert(address + i as u16, *v);
        }
        return Ok(());
    }
}
