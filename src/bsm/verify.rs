//! Verification of signed snapshots against the public key of the meter.

use log::{debug, info};

use super::blob;
use super::snapshot::{PollOptions, SnapshotOutcome};
use super::{BsmDevice, BsmError};
use crate::bsm::crypto::DigestAlgorithm;
use crate::sunspec::types::registers_to_bytes;
use crate::sunspec::{Model, ModelHandle, TextEncoding, Transport};

/// Receives human readable lines about the verification steps. Every line is
/// logged at debug level too.
pub struct Tracer<'a> {
    sink: Option<&'a mut dyn FnMut(&str)>,
}

impl<'a> Tracer<'a> {
    pub fn new(sink: Option<&'a mut dyn FnMut(&str)>) -> Self {
        return Tracer { sink };
    }

    pub fn line(&mut self, line: &str) {
        debug!("{line}");
        if let Some(sink) = &mut self.sink {
            sink(line);
        }
    }
}

/// Digest over the fixed block points of a snapshot, skipping `excluded`. The
/// points are hashed in definition order, as their big-endian register bytes.
pub fn md_for_snapshot_data(
    model: &Model,
    excluded: &[String],
    encoding: TextEncoding,
    digest: DigestAlgorithm,
    tracer: &mut Tracer,
) -> Result<Vec<u8>, BsmError> {
    let mut parts = Vec::new();

    if let Some(block) = model.blocks().first() {
        for point in block.points() {
            if excluded.iter().any(|id| id == point.id()) {
                continue;
            }

            let bytes = registers_to_bytes(&point.registers(encoding)?);
            tracer.line(&format!("{}: {}", point.id(), hex::encode(&bytes)));
            parts.push(bytes);
        }
    }

    return Ok(digest.digest(parts.iter().map(|p| p.as_slice())));
}

impl<T: Transport> BsmDevice<T> {
    fn check_blob_length(&self, handle: ModelHandle, declared: i64) -> Result<(), BsmError> {
        let blocks = self.model_ref(handle).blocks().len();
        if blocks as i64 != declared + 1 {
            return Err(BsmError::LayoutMismatch { model: self.model_name(handle), declared, blocks });
        }

        return Ok(());
    }

    fn checked_blob(&self, handle: ModelHandle, length_point: &str) -> Result<Vec<u8>, BsmError> {
        let declared = match self.point_integer(handle, length_point)? {
            Some(length) => length,
            /* blocks but no length: not read yet */
            None if self.model_ref(handle).blocks().len() > 1 => {
                return Err(BsmError::MissingValue { model: self.model_name(handle), point: length_point.to_string() });
            }
            None => 0,
        };
        self.check_blob_length(handle, declared)?;
        return Ok(blob::blob(self.model_ref(handle)).unwrap_or_default());
    }

    pub fn snapshot_digest(&self, handle: ModelHandle) -> Result<Vec<u8>, BsmError> {
        return md_for_snapshot_data(
            self.model_ref(handle),
            &self.config.points.digest_excluded,
            self.device.encoding(),
            self.config.crypto.digest,
            &mut Tracer::new(None),
        );
    }

    /// Verifies the signature of the snapshot known as `alias`.
    ///
    /// With `read_fresh` the meter model and the snapshot are read from the
    /// device first, otherwise the values of the last read are used. Missing
    /// key or signature data result in `Ok(false)`. Inconsistent layouts and
    /// an unexpected curve are errors.
    pub fn verify_snapshot(
        &mut self,
        alias: &str,
        read_fresh: bool,
        trace: Option<&mut dyn FnMut(&str)>,
    ) -> Result<bool, BsmError> {
        let meter = self.model(&self.config.bsm_model_alias)?;
        let snapshot = self.snapshot(alias)?;

        if read_fresh {
            self.read_model(meter)?;
            self.read_model(snapshot)?;
        }

        let points = &self.config.points;
        let curve_name = self.point_text(meter, &points.bsm_curve_name)?;
        let public_key = self.checked_blob(meter, &points.bsm_public_key_length)?;
        let signature = self.checked_blob(snapshot, &points.snapshot_signature_length)?;

        let mut tracer = Tracer::new(trace);
        tracer.line(&format!("Verifying {alias} ..."));
        tracer.line(&format!("Curve: {}", curve_name.as_deref().unwrap_or("")));
        tracer.line(&format!("Public key: {}", hex::encode(&public_key)));
        tracer.line(&format!("Signature: {}", hex::encode(&signature)));

        if public_key.is_empty() {
            tracer.line("Failed. Device has no public key.");
            return Ok(false);
        }

        if signature.is_empty() {
            tracer.line("Failed. Snapshot contains no signature.");
            return Ok(false);
        }

        let crypto = &self.config.crypto;
        if curve_name.as_deref() != Some(crypto.curve.name()) {
            return Err(BsmError::UnexpectedCurve { expected: crypto.curve.name().to_string(), actual: curve_name });
        }

        tracer.line(&format!("Computing {} digest for snapshot data:", crypto.digest.name()));
        let digest = md_for_snapshot_data(
            self.model_ref(snapshot),
            &points.digest_excluded,
            self.device.encoding(),
            crypto.digest,
            &mut tracer,
        )?;
        tracer.line(&format!("Snapshot data {} digest: {}", crypto.digest.name(), hex::encode(&digest)));

        let valid = self.crypto.verify_signed_digest(crypto.curve, crypto.digest, &public_key, &signature, &digest);
        if valid {
            tracer.line("Success.");
            info!("Signature of {alias} is valid");
        } else {
            tracer.line("Failed.");
            info!("Signature of {alias} is invalid");
        }

        return Ok(valid);
    }

    /// Creates a snapshot and checks its signature once the meter is done with
    /// it. The signature is only checked for a valid snapshot.
    pub fn verify_new_snapshot(
        &mut self,
        alias: &str,
        options: &PollOptions,
        trace: Option<&mut dyn FnMut(&str)>,
    ) -> Result<(SnapshotOutcome, bool), BsmError> {
        let outcome = self.poll_snapshot(alias, options)?;
        if outcome.snapshot().is_none() {
            return Ok((outcome, false));
        }

        /* polling left the snapshot freshly read, the key is still missing */
        let meter = self.model(&self.config.bsm_model_alias)?;
        self.read_model(meter)?;
        let valid = self.verify_snapshot(alias, false, trace)?;

        return Ok((outcome, valid));
    }
}

#[cfg(test)]
mod tests {
    use super::super::crypto::{CryptoError, CryptoProvider, Curve, KeyFormat};
    use super::super::simulator::SimulatedMeter;
    use super::super::snapshot::SnapshotStatus;
    use super::*;
    use crate::config::BsmConfig;
    use crate::sunspec::{ModelLibrary, PointValue};
    use p256::ecdsa::signature::hazmat::PrehashSigner;
    use p256::ecdsa::{Signature, SigningKey};
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    const FAST: PollOptions = PollOptions { interval: Duration::ZERO, timeout: Some(Duration::from_secs(5)) };

    struct FixedAnswer {
        answer: bool,
        calls: Rc<Cell<usize>>,
    }

    impl CryptoProvider for FixedAnswer {
        fn public_key_from_blob(&self, _: Curve, _: DigestAlgorithm, blob: &[u8], _: KeyFormat) -> Result<Vec<u8>, CryptoError> {
            return Ok(blob.to_vec());
        }

        fn verify_signed_digest(&self, _: Curve, _: DigestAlgorithm, _: &[u8], _: &[u8], _: &[u8]) -> bool {
            self.calls.set(self.calls.get() + 1);
            return self.answer;
        }
    }

    fn device(meter: SimulatedMeter, answer: bool) -> (BsmDevice<SimulatedMeter>, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let provider = FixedAnswer { answer, calls: calls.clone() };
        let bsm = BsmDevice::new(meter, ModelLibrary::builtin().unwrap(), BsmConfig::default())
            .unwrap()
            .with_crypto_provider(Box::new(provider));
        return (bsm, calls);
    }

    fn meter_with_data() -> SimulatedMeter {
        let mut meter = SimulatedMeter::new(32, 32);
        meter.set_blob("bsm", &[0x11; 64]);
        meter.set_blob("scs", &[0x22; 64]);
        return meter;
    }

    fn verify(bsm: &mut BsmDevice<SimulatedMeter>, alias: &str) -> (Result<bool, BsmError>, Vec<String>) {
        let mut lines = Vec::new();
        let mut sink = |line: &str| lines.push(line.to_string());
        let result = bsm.verify_snapshot(alias, true, Some(&mut sink));
        return (result, lines);
    }

    #[test]
    fn test_provider_answer_is_returned() {
        for answer in [true, false] {
            let (mut bsm, calls) = device(meter_with_data(), answer);
            let (result, lines) = verify(&mut bsm, "scs");
            assert_eq!(result.unwrap(), answer);
            assert_eq!(calls.get(), 1);
            assert_eq!(lines[0], "Verifying scs ...");
            assert_eq!(lines[1], "Curve: secp256r1");
            assert_eq!(lines[2], format!("Public key: {}", "11".repeat(64)));
            assert_eq!(lines.last().unwrap(), if answer { "Success." } else { "Failed." });
        }
    }

    #[test]
    fn test_no_public_key() {
        let mut meter = SimulatedMeter::new(0, 32);
        meter.set_blob("scs", &[0x22; 64]);
        let (mut bsm, calls) = device(meter, true);

        let (result, lines) = verify(&mut bsm, "scs");
        assert!(!result.unwrap());
        assert_eq!(calls.get(), 0);
        assert_eq!(lines.last().unwrap(), "Failed. Device has no public key.");
    }

    #[test]
    fn test_no_signature() {
        let mut meter = SimulatedMeter::new(32, 0);
        meter.set_blob("bsm", &[0x11; 64]);
        let (mut bsm, calls) = device(meter, true);

        let (result, lines) = verify(&mut bsm, "stoffs");
        assert!(!result.unwrap());
        assert_eq!(calls.get(), 0);
        assert_eq!(lines.last().unwrap(), "Failed. Snapshot contains no signature.");
    }

    #[test]
    fn test_layout_mismatch() {
        let mut meter = meter_with_data();
        meter.set_point("bsm", "NPK", PointValue::Integer(5));
        let (mut bsm, calls) = device(meter, true);
        assert!(matches!(verify(&mut bsm, "scs").0, Err(BsmError::LayoutMismatch { declared: 5, blocks: 33, .. })));

        let mut meter = meter_with_data();
        meter.set_point("scs", "NSig", PointValue::Integer(40));
        let (mut bsm, _) = device(meter, true);
        assert!(matches!(verify(&mut bsm, "scs").0, Err(BsmError::LayoutMismatch { declared: 40, .. })));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_unexpected_curve() {
        let mut meter = meter_with_data();
        meter.set_point("bsm", "Curve", "brainpoolP256r1".into());
        let (mut bsm, calls) = device(meter, true);

        match verify(&mut bsm, "scs").0 {
            Err(BsmError::UnexpectedCurve { expected, actual }) => {
                assert_eq!(expected, "secp256r1");
                assert_eq!(actual.as_deref(), Some("brainpoolP256r1"));
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_unknown_snapshot() {
        let (mut bsm, _) = device(meter_with_data(), true);
        assert!(matches!(verify(&mut bsm, "bsm").0, Err(BsmError::UnknownSnapshotAlias(_))));
    }

    #[test]
    fn test_digest_skips_status_and_signature_length() {
        let (mut bsm, _) = device(meter_with_data(), true);
        let scs = bsm.snapshot("scs").unwrap();
        bsm.read_model(scs).unwrap();
        let before = bsm.snapshot_digest(scs).unwrap();

        bsm.device_mut().transport_mut().set_point("scs", "St", PointValue::Integer(1));
        bsm.read_model(scs).unwrap();
        assert_eq!(bsm.snapshot_digest(scs).unwrap(), before);

        bsm.device_mut().transport_mut().set_point("scs", "RCR", PointValue::Integer(17));
        bsm.read_model(scs).unwrap();
        assert_ne!(bsm.snapshot_digest(scs).unwrap(), before);
        assert_eq!(before.len(), 32);
    }

    #[test]
    fn test_signed_snapshot_end_to_end() {
        let signing = SigningKey::from_slice(&[0x17; 32]).unwrap();
        let public_key = signing.verifying_key().to_encoded_point(false).as_bytes()[1..].to_vec();

        let mut meter = SimulatedMeter::new(32, 32);
        meter.set_blob("bsm", &public_key);
        meter.set_point("stons", "TotWhImp", PointValue::Integer(123456));
        meter.set_point("stons", "Wh_SF", PointValue::Integer(-1));
        meter.set_point("stons", "MA1", "001BZR10".into());
        meter.set_point("stons", "RCR", PointValue::Integer(3));
        let mut bsm = BsmDevice::new(meter, ModelLibrary::builtin().unwrap(), BsmConfig::default()).unwrap();

        let stons = bsm.snapshot("stons").unwrap();
        bsm.read_model(stons).unwrap();
        let digest = bsm.snapshot_digest(stons).unwrap();
        let signature: Signature = signing.sign_prehash(&digest).unwrap();
        bsm.device_mut().transport_mut().set_blob("stons", &signature.to_bytes());

        let (result, lines) = verify(&mut bsm, "stons");
        assert!(result.unwrap());
        assert!(lines.iter().any(|l| l == "TotWhImp: 0001e240"));
        assert!(lines.iter().any(|l| l == "Computing SHA-256 digest for snapshot data:"));
        assert!(!lines.iter().any(|l| l.starts_with("St:") || l.starts_with("NSig:")));

        bsm.device_mut().transport_mut().set_point("stons", "TotWhImp", PointValue::Integer(123457));
        let (result, _) = verify(&mut bsm, "stons");
        assert!(!result.unwrap());
    }

    fn signed_meter() -> BsmDevice<SimulatedMeter> {
        let signing = SigningKey::from_slice(&[0x17; 32]).unwrap();
        let public_key = signing.verifying_key().to_encoded_point(false).as_bytes()[1..].to_vec();

        let mut meter = SimulatedMeter::new(32, 32);
        meter.set_blob("bsm", &public_key);
        meter.set_point("scs", "TotWhImp", PointValue::Integer(4711));
        meter.set_point("scs", "RCnt", PointValue::Integer(12));
        let mut bsm = BsmDevice::new(meter, ModelLibrary::builtin().unwrap(), BsmConfig::default()).unwrap();

        /* the meter signs the snapshot data, the status is not covered */
        let scs = bsm.snapshot("scs").unwrap();
        bsm.read_model(scs).unwrap();
        let digest = bsm.snapshot_digest(scs).unwrap();
        let signature: Signature = signing.sign_prehash(&digest).unwrap();
        bsm.device_mut().transport_mut().set_blob("scs", &signature.to_bytes());

        return bsm;
    }

    #[test]
    fn test_unread_meter_is_reported() {
        let mut bsm = signed_meter();
        bsm.device_mut().transport_mut().script_status("scs", &[2, 0]);

        let outcome = bsm.poll_snapshot("scs", &FAST).unwrap();
        assert!(outcome.snapshot().is_some());
        match bsm.verify_snapshot("scs", false, None) {
            Err(BsmError::MissingValue { model, point }) => {
                assert_eq!(model, "Signing Meter");
                assert_eq!(point, "NPK");
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert!(bsm.verify_snapshot("scs", true, None).unwrap());
    }

    #[test]
    fn test_verify_new_snapshot() {
        let mut bsm = signed_meter();
        bsm.device_mut().transport_mut().script_status("scs", &[2, 2, 0]);

        let mut lines = Vec::new();
        let mut sink = |line: &str| lines.push(line.to_string());
        let (outcome, valid) = bsm.verify_new_snapshot("scs", &FAST, Some(&mut sink)).unwrap();
        assert_eq!(outcome, SnapshotOutcome::Valid(bsm.snapshot("scs").unwrap()));
        assert!(valid);
        assert_eq!(lines.last().unwrap(), "Success.");
    }

    #[test]
    fn test_verify_new_snapshot_failed() {
        let mut bsm = signed_meter();
        bsm.device_mut().transport_mut().script_status("scs", &[2, 4]);

        let (outcome, valid) = bsm.verify_new_snapshot("scs", &FAST, None).unwrap();
        assert_eq!(outcome, SnapshotOutcome::Failed(SnapshotStatus::FailedNotEnabled));
        assert!(!valid);
    }
}
