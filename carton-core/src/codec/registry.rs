use super::bzip2c::Bzip2Codec;
use super::deflate::DeflateCodec;
use super::gzip::GzipCodec;
use super::store::Store;
use super::xzc::XzCodec;
use super::zstdc::ZstdCompressor;
use super::{Codec, CodecId};
use crate::error::{CartonError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Maps codec ids to streaming encoder/decoder implementations.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: BTreeMap<CodecId, Arc<dyn Codec>>,
}

impl CodecRegistry {
    /// A registry with no codecs; see [`CodecRegistry::default`] for the built-ins.
    pub fn empty() -> Self {
        Self {
            codecs: BTreeMap::new(),
        }
    }

    /// Registers `codec` under its own id, returning the codec it replaced.
    pub fn register(&mut self, codec: Arc<dyn Codec>) -> Option<Arc<dyn Codec>> {
        self.codecs.insert(codec.id(), codec)
    }

    pub fn get(&self, id: CodecId) -> Result<&dyn Codec> {
        self.codecs
            .get(&id)
            .map(|c| c.as_ref())
            .ok_or_else(|| CartonError::UnsupportedCodec(id.name().to_string()))
    }

    pub fn by_zip_method(&self, method: u16) -> Result<&dyn Codec> {
        let id = CodecId::from_zip_method(method)
            .ok_or_else(|| CartonError::UnsupportedCodec(format!("zip method {method}")))?;
        self.get(id)
    }

    pub fn contains(&self, id: CodecId) -> bool {
        self.codecs.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<CodecId> {
        self.codecs.keys().copied().collect()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut reg = Self::empty();
        reg.register(Arc::new(Store));
        reg.register(Arc::new(DeflateCodec));
        reg.register(Arc::new(GzipCodec));
        reg.register(Arc::new(Bzip2Codec));
        reg.register(Arc::new(XzCodec));
        reg.register(Arc::new(ZstdCompressor));
        reg
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.codecs.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn default_registry_has_every_builtin() {
        let reg = CodecRegistry::default();
        assert_eq!(reg.ids(), CodecId::ALL.to_vec());
        assert_eq!(reg.by_zip_method(8).unwrap().id(), CodecId::Deflate);
    }

    #[test]
    fn missing_codec_is_reported() {
        let reg = CodecRegistry::empty();
        let err = reg.get(CodecId::Zstd).err().unwrap();
        assert!(matches!(err, CartonError::UnsupportedCodec(ref n) if n == "zstd"));
        assert!(reg.by_zip_method(14).is_err());
    }

    #[test]
    fn register_replaces_by_id() {
        let mut reg = CodecRegistry::empty();
        assert!(reg.register(Arc::new(Store)).is_none());
        assert!(reg.register(Arc::new(Store)).is_some());
        assert!(reg.contains(CodecId::Store));
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<std::sync::Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn every_codec_streams_through_encoder_and_decoder() {
        let reg = CodecRegistry::default();
        let text = b"the quick brown fox jumps over the lazy dog\n".repeat(200);
        for id in reg.ids() {
            let codec = reg.get(id).unwrap();
            let buf = SharedBuf::default();
            let mut enc = codec.encoder(Box::new(buf.clone()), Some(1)).unwrap();
            enc.write_all(&text).unwrap();
            enc.finish().unwrap();
            let packed = buf.0.lock().unwrap().clone();

            let mut dec = codec.decoder(Box::new(std::io::Cursor::new(packed))).unwrap();
            let mut out = Vec::new();
            dec.read_to_end(&mut out).unwrap();
            assert_eq!(out, text, "{id}");
        }
    }

    #[test]
    fn borrowed_compress_reports_uncompressed_length() {
        let reg = CodecRegistry::default();
        let text = vec![7u8; 10_000];
        for id in reg.ids() {
            let codec = reg.get(id).unwrap();
            let mut packed = Vec::new();
            let n = codec.compress(&mut &text[..], &mut packed, None).unwrap();
            assert_eq!(n, text.len() as u64, "{id}");

            let mut out = Vec::new();
            let m = codec.decompress(&mut &packed[..], &mut out).unwrap();
            assert_eq!(m, text.len() as u64, "{id}");
            assert_eq!(out, text, "{id}");
        }
    }
}
