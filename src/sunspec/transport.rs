use super::SunSpecError;

/// Holding register access to one device. Implementations own the connection
/// and handle one request at a time.
pub trait Transport {
    fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>, SunSpecError>;
    fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<(), SunSpecError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>, SunSpecError> {
        return (**self).read_registers(address, count);
    }

    fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<(), SunSpecError> {
        return (**self).write_registers(address, values);
    }
}

#[cfg(feature = "modbus")]
pub use modbus::{open_transport, ModbusStreamTransport, ModbusTcpTransport};
#[cfg(feature = "serial")]
pub use modbus::ModbusRtuTransport;

#[cfg(feature = "modbus")]
mod modbus {
    use std::io::{Read, Write};
    use std::net::{TcpStream, ToSocketAddrs};
    use std::time::Duration;

    use log::{debug, info};
    use rmodbus::{client::ModbusRequest, guess_response_frame_len, ModbusProto};

    use super::Transport;
    use crate::config::{ConnectionConfig, ModbusProtoConfig};
    use crate::sunspec::SunSpecError;

    /// Modbus over any byte stream to a single unit. TCP framing or RTU
    /// framing, the latter over a serial line or tunneled over TCP.
    pub struct ModbusStreamTransport<S: Read + Write> {
        stream: S,
        unit_id: u8,
        proto: ModbusProto,
        peer: String,
    }

    pub type ModbusTcpTransport = ModbusStreamTransport<TcpStream>;

    #[cfg(feature = "serial")]
    pub type ModbusRtuTransport = ModbusStreamTransport<Box<dyn serialport::SerialPort>>;

    fn modbus_error<E: std::fmt::Debug>(e: E) -> SunSpecError {
        return SunSpecError::Modbus(format!("{e:?}"));
    }

    /// Opens the transport selected by `config.proto`.
    pub fn open_transport(config: &ConnectionConfig) -> Result<Box<dyn Transport>, SunSpecError> {
        return match config.proto {
            ModbusProtoConfig::TCP | ModbusProtoConfig::RTUoverTCP => Ok(Box::new(ModbusTcpTransport::connect(config)?)),
            #[cfg(feature = "serial")]
            ModbusProtoConfig::RTU => Ok(Box::new(ModbusRtuTransport::open(config)?)),
            #[cfg(not(feature = "serial"))]
            ModbusProtoConfig::RTU => Err(SunSpecError::Modbus("built without serial support".to_string())),
        };
    }

    impl<S: Read + Write> ModbusStreamTransport<S> {
        pub fn new(stream: S, unit_id: u8, proto: ModbusProto, peer: String) -> Self {
            return ModbusStreamTransport { stream, unit_id, proto, peer };
        }

        fn transact(&mut self, request: &[u8]) -> Result<Vec<u8>, SunSpecError> {
            self.stream.write_all(request)?;
            self.stream.flush()?;

            /* enough of the frame to learn its full length */
            let header_len = match self.proto {
                ModbusProto::Rtu => 3,
                _ => 6,
            };
            let mut response = vec![0u8; header_len];
            self.stream.read_exact(&mut response)?;

            let len = guess_response_frame_len(&response, self.proto).map_err(modbus_error)? as usize;
            if len > header_len {
                let mut rest = vec![0u8; len - header_len];
                self.stream.read_exact(&mut rest)?;
                response.extend_from_slice(&rest);
            }

            return Ok(response);
        }
    }

    impl ModbusStreamTransport<TcpStream> {
        pub fn connect(config: &ConnectionConfig) -> Result<Self, SunSpecError> {
            let peer = format!("{}:{}", config.host, config.port);
            let timeout = Duration::from_secs(config.timeout);

            let addr = (config.host.as_str(), config.port)
                .to_socket_addrs()?
                .next()
                .ok_or_else(|| SunSpecError::Modbus(format!("Unable to resolve {peer}")))?;

            let stream = TcpStream::connect_timeout(&addr, timeout)?;
            stream.set_read_timeout(Some(timeout))?;
            stream.set_write_timeout(Some(timeout))?;
            let _ = stream.set_nodelay(true);

            /* if we use RTUoverTCP we need to add all of those fancy CRC stuff */
            let proto = match config.proto {
                ModbusProtoConfig::TCP => ModbusProto::TcpUdp,
                _ => ModbusProto::Rtu,
            };

            info!("Connected to {} (unit {}, {:?})", peer, config.slave_id, config.proto);
            return Ok(Self::new(stream, config.slave_id, proto, peer));
        }
    }

    #[cfg(feature = "serial")]
    impl ModbusStreamTransport<Box<dyn serialport::SerialPort>> {
        pub fn open(config: &ConnectionConfig) -> Result<Self, SunSpecError> {
            use crate::config::ParityConfig;
            use serialport::{DataBits, Parity, StopBits};

            let parity = match config.parity {
                ParityConfig::None => Parity::None,
                ParityConfig::Even => Parity::Even,
                ParityConfig::Odd => Parity::Odd,
            };

            let port = serialport::new(config.device.as_str(), config.baudrate)
                .data_bits(DataBits::Eight)
                .stop_bits(StopBits::One)
                .parity(parity)
                .timeout(Duration::from_secs(config.timeout))
                .open()
                .map_err(std::io::Error::from)?;

            info!("Opened {} at {} baud (unit {}, {:?} parity)", config.device, config.baudrate, config.slave_id, config.parity);
            return Ok(Self::new(port, config.slave_id, ModbusProto::Rtu, config.device.clone()));
        }
    }

    impl<S: Read + Write> Transport for ModbusStreamTransport<S> {
        fn read_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>, SunSpecError> {
            debug!("{}: reading {} registers at {}", self.peer, count, address);
            let mut mreq = ModbusRequest::new(self.unit_id, self.proto);
            let mut request = Vec::new();
            mreq.generate_get_holdings(address, count, &mut request).map_err(modbus_error)?;

            let response = self.transact(&request)?;
            let mut data = Vec::new();
            mreq.parse_u16(&response, &mut data).map_err(modbus_error)?;

            if data.len() < count as usize {
                return Err(SunSpecError::ShortRead { address, expected: count as usize, actual: data.len() });
            }
            data.truncate(count as usize);

            return Ok(data);
        }

        fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<(), SunSpecError> {
            debug!("{}: writing {} registers at {}", self.peer, values.len(), address);
            let mut mreq = ModbusRequest::new(self.unit_id, self.proto);
            let mut request = Vec::new();
            mreq.generate_set_holdings_bulk(address, values, &mut request).map_err(modbus_error)?;

            let response = self.transact(&request)?;
            mreq.parse_ok(&response).map_err(modbus_error)?;

            return Ok(());
        }
    }

}
