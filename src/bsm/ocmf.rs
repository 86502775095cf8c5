//! Transaction documents from OCMF formatted turn-on and turn-off snapshots.

use log::{info, warn};

use super::blob;
use super::crypto::KeyFormat;
use super::registry::{OCMF_TURN_OFF_ALIAS, OCMF_TURN_ON_ALIAS};
use super::snapshot::SnapshotStatus;
use super::{BsmDevice, BsmError};
use crate::sunspec::{ModelHandle, Transport};

fn transaction_xml(encoding: &str, public_key: &str, turn_on: &str, turn_off: &str) -> String {
    return format!(
        "<?xml version=\"1.0\" encoding=\"{encoding}\" standalone=\"yes\"?>\n\
         <values>\n\
         \x20 <value transactionId=\"1\" context=\"Transaction.Begin\">\n\
         \x20   <signedData format=\"OCMF\" encoding=\"plain\">{turn_on}</signedData>\n\
         \x20   <publicKey encoding=\"plain\">{public_key}</publicKey>\n\
         \x20 </value>\n\
         \x20 <value transactionId=\"1\" context=\"Transaction.End\">\n\
         \x20   <signedData format=\"OCMF\" encoding=\"plain\">{turn_off}</signedData>\n\
         \x20   <publicKey encoding=\"plain\">{public_key}</publicKey>\n\
         \x20 </value>\n\
         </values>\n"
    );
}

impl<T: Transport> BsmDevice<T> {
    fn ocmf_data(&self, handle: ModelHandle) -> Result<Option<String>, BsmError> {
        let points = &self.config.points;
        let status = self.point_integer(handle, &points.ocmf_status)?;
        if status != Some(SnapshotStatus::Valid as i64) {
            return Ok(None);
        }

        return self.point_text(handle, &points.ocmf_data);
    }

    /// XML document with the OCMF data of the turn-on and turn-off snapshots
    /// and the public key of the meter.
    ///
    /// The document declares the configured string encoding and is returned
    /// as bytes in exactly this encoding, as the meter signed the OCMF data in
    /// it. `None` unless both snapshots are valid and the meter exports a
    /// usable public key.
    pub fn generate_ocmf_xml(&mut self, read_fresh: bool) -> Result<Option<Vec<u8>>, BsmError> {
        let meter = self.model(&self.config.bsm_model_alias)?;
        let turn_on = self.model(OCMF_TURN_ON_ALIAS)?;
        let turn_off = self.model(OCMF_TURN_OFF_ALIAS)?;

        if read_fresh {
            self.read_model(meter)?;
            self.read_model(turn_on)?;
            self.read_model(turn_off)?;
        }

        let (turn_on_data, turn_off_data) = match (self.ocmf_data(turn_on)?, self.ocmf_data(turn_off)?) {
            (Some(on), Some(off)) => (on, off),
            _ => {
                warn!("No valid OCMF turn-on and turn-off snapshots");
                return Ok(None);
            }
        };

        let public_key = match blob::blob(self.model_ref(meter)) {
            Some(key) => key,
            None => {
                warn!("Meter exports no public key");
                return Ok(None);
            }
        };

        let crypto = &self.config.crypto;
        let der = match self.crypto.public_key_from_blob(crypto.curve, crypto.digest, &public_key, KeyFormat::Der) {
            Ok(der) => der,
            Err(e) => {
                warn!("Unusable public key {}: {e}", hex::encode(&public_key));
                return Ok(None);
            }
        };

        let encoding = self.device.encoding();
        let xml = transaction_xml(encoding.xml_name(), &hex::encode(der), &turn_on_data, &turn_off_data);
        info!("Generated OCMF transaction with {} bytes", xml.len());

        return Ok(Some(encoding.encode(&xml)?));
    }
}
