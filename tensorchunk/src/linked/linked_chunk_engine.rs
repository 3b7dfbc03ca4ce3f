//! Chunk engine for tensors whose samples point at external objects
//!
//! Paths are stored as text through a base [`ChunkEngine`]; a parallel
//! creds encoder records which credentials each sample needs. Reads fetch
//! the referenced object and hand it to a [`MediaDecoder`].

use std::path::Path;
use std::sync::Arc;

use tensorchunk_core::CredsEncoder;
use tracing::debug;

use super::link_creds::{LinkCreds, ProviderFamily};
use super::media::MediaDecoder;
use crate::array::SampleArray;
use crate::config::ChunkConfig;
use crate::engine::{apply_sub_index, ChunkEngine};
use crate::error::{Error, Result};
use crate::index::{normalize_frame_index, DimIndex, Index};
use crate::meta::{Htype, LoadOutcome, MetaCache, TensorMeta};
use crate::sample::{LinkedSample, Sample, SampleValue};
use crate::storage::{LocalProvider, StorageProvider, StoredBytes};

#[derive(Debug)]
pub struct LinkedChunkEngine {
    base: ChunkEngine,
    creds_encoder: MetaCache<CredsEncoder>,
    link_creds: Arc<LinkCreds>,
    decoder: Arc<dyn MediaDecoder>,
}

impl LinkedChunkEngine {
    pub fn new(
        key: &str,
        storage: Arc<dyn StorageProvider>,
        config: ChunkConfig,
        link_creds: Arc<LinkCreds>,
        decoder: Arc<dyn MediaDecoder>,
    ) -> Self {
        Self::from_base(ChunkEngine::new(key, storage, config), link_creds, decoder)
    }

    /// Wrap an engine; its chunk read cache is turned off
    pub fn from_base(base: ChunkEngine, link_creds: Arc<LinkCreds>, decoder: Arc<dyn MediaDecoder>) -> Self {
        let creds_encoder = MetaCache::new(base.key());
        Self {
            base: base.without_data_cache(),
            creds_encoder,
            link_creds,
            decoder,
        }
    }

    /// Declare a linked tensor of `htype`
    pub fn create_tensor(&self, htype: Htype) -> Result<()> {
        self.base.create_tensor(TensorMeta::linked(htype))
    }

    pub fn base(&self) -> &ChunkEngine {
        &self.base
    }

    pub fn link_creds(&self) -> &LinkCreds {
        &self.link_creds
    }

    /// Linked data is never cached by the engine
    pub fn is_data_cachable(&self) -> bool {
        false
    }

    pub fn num_samples(&self) -> Result<u64> {
        self.base.num_samples()
    }

    /// Load the creds encoder for the current commit, creating it if absent
    pub fn load_creds_encoder(&self) -> Result<LoadOutcome> {
        self.creds_encoder
            .load_or_create(&**self.base.meta_storage(), self.base.commit_id())
    }

    pub fn creds_encoder(&self) -> Result<CredsEncoder> {
        self.creds_encoder.get(&**self.base.meta_storage(), self.base.commit_id())
    }

    pub(crate) fn replace_creds_encoder(&self, encoder: CredsEncoder) {
        self.creds_encoder.replace(self.base.commit_id(), encoder);
    }

    pub(crate) fn base_mut(&mut self) -> &mut ChunkEngine {
        &mut self.base
    }

    fn links_of(samples: &[Sample]) -> Result<Vec<&LinkedSample>> {
        samples
            .iter()
            .map(|sample| sample.as_link().ok_or(Error::LinkedSampleType(sample.kind())))
            .collect()
    }

    /// Append linked samples; nothing is written if any sample is not linked
    pub fn extend(&mut self, samples: Vec<Sample>) -> Result<()> {
        let links = Self::links_of(&samples)?;
        let encoded = links
            .iter()
            .map(|link| self.link_creds.get_encoding(link.creds_key.as_deref()))
            .collect::<Result<Vec<_>>>()?;
        let paths = links.iter().map(|link| Sample::Text(link.path.clone())).collect();

        self.base.extend(paths)?;
        self.register_new_creds(&encoded)
    }

    /// Record the encoded credentials of newly appended samples
    fn register_new_creds(&self, encoded: &[u32]) -> Result<()> {
        self.creds_encoder
            .write(&**self.base.meta_storage(), self.base.commit_id(), |encoder| {
                for &value in encoded {
                    encoder.register_samples(value, 1);
                }
            })
    }

    /// Point sample `index` at another object
    pub fn update(&mut self, index: u64, sample: Sample) -> Result<()> {
        let link = sample.as_link().ok_or(Error::LinkedSampleType(sample.kind()))?;
        let encoded = self.link_creds.get_encoding(link.creds_key.as_deref())?;
        self.base.update(index, Sample::Text(link.path.clone()))?;
        self.set_creds(index, encoded)
    }

    /// Change only the credentials of sample `index`
    pub fn update_creds(&self, index: u64, sample: &LinkedSample) -> Result<()> {
        let encoded = self.link_creds.get_encoding(sample.creds_key.as_deref())?;
        self.set_creds(index, encoded)
    }

    fn set_creds(&self, index: u64, encoded: u32) -> Result<()> {
        self.creds_encoder
            .write(&**self.base.meta_storage(), self.base.commit_id(), |encoder| {
                encoder.set(index, encoded)
            })??;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.base.flush()?;
        self.creds_encoder.flush(&**self.base.meta_storage())
    }

    pub fn checkout(&mut self, commit_id: &str) -> Result<()> {
        self.flush()?;
        self.base.checkout(commit_id)?;
        self.creds_encoder.invalidate();
        Ok(())
    }

    /// Stored path of sample `index`
    pub fn get_path(&self, index: u64) -> Result<String> {
        match self.base.read_sample(index, true)? {
            SampleValue::Text(path) => Ok(path),
            SampleValue::Array(_) => Err(Error::SampleKind {
                expected: "text",
                actual: "array",
            }),
            SampleValue::Json(_) => Err(Error::SampleKind {
                expected: "text",
                actual: "json",
            }),
        }
    }

    /// Credentials key of sample `index`
    pub fn get_creds_key(&self, index: u64) -> Result<Option<String>> {
        let encoded = self
            .creds_encoder
            .read(&**self.base.meta_storage(), self.base.commit_id(), |encoder| {
                encoder.get_encoded_creds_key(index)
            })??;
        Ok(self.link_creds.get_creds_key(encoded)?.map(str::to_string))
    }

    /// Fetch the object sample `index` points at
    fn fetch(&self, path: &str, creds_key: Option<&str>) -> Result<StoredBytes> {
        let family = ProviderFamily::of(path);
        let object_key = family.object_key(path);
        if family.is_remote() {
            let provider = self.link_creds.storage_provider_for(creds_key, family)?;
            provider.get(object_key)
        } else {
            LocalProvider::read_path(Path::new(object_key))
        }
    }

    /// URL a media decoder can open directly
    fn resolve_url(&self, path: &str, creds_key: Option<&str>) -> Result<String> {
        let family = ProviderFamily::of(path);
        match family {
            ProviderFamily::S3 | ProviderFamily::Gcs => self
                .link_creds
                .storage_provider_for(creds_key, family)?
                .presigned_url(family.object_key(path)),
            ProviderFamily::Http | ProviderFamily::Local => Ok(path.to_string()),
        }
    }

    /// Fetch and fully decode sample `index`, then apply `sub_index`
    pub fn get_basic_sample(&self, index: u64, sub_index: &[DimIndex]) -> Result<SampleValue> {
        let path = self.get_path(index)?;
        let creds_key = self.get_creds_key(index)?;
        let bytes = self.fetch(&path, creds_key.as_deref())?;
        let array = self.decoder.decode(&bytes, &path)?;
        apply_sub_index(SampleValue::Array(array), sub_index)
    }

    /// Decode only the frames of a linked video that `sub_index` selects
    ///
    /// The first entry of `sub_index` picks frames; an integer drops the
    /// frame axis. The remaining entries apply inside each frame.
    pub fn get_video_sample(&self, index: u64, sub_index: &[DimIndex]) -> Result<SampleArray> {
        let path = self.get_path(index)?;
        let creds_key = self.get_creds_key(index)?;
        let url = self.resolve_url(&path, creds_key.as_deref())?;

        let shape = self.decoder.probe_shape(&url)?;
        let num_frames = shape.first().copied().unwrap_or(0);
        let frame_index = sub_index.first();
        let window = normalize_frame_index(frame_index, num_frames)?;
        debug!(path, ?window, num_frames, "decoding video window");

        let video = self.decoder.decode_window(&url, window)?;
        let rest = sub_index.get(1..).unwrap_or(&[]);
        if frame_index.is_some_and(DimIndex::is_int) {
            return video.squeeze_leading().select(rest);
        }
        if rest.is_empty() {
            return Ok(video);
        }
        let mut inner = Vec::with_capacity(sub_index.len());
        inner.push(DimIndex::full());
        inner.extend_from_slice(rest);
        video.select(&inner)
    }

    /// Decoded samples selected by `index`, stacked unless only one is picked
    pub fn numpy(&self, index: &Index) -> Result<SampleArray> {
        let is_video = self.base.tensor_meta()?.htype == Htype::Video;
        let sub_index = index.sub_index();
        let mut arrays = index
            .sample_indices(self.num_samples()?)?
            .into_iter()
            .map(|i| {
                if is_video {
                    self.get_video_sample(i, sub_index)
                } else {
                    self.get_basic_sample(i, sub_index)?.into_array()
                }
            })
            .collect::<Result<Vec<_>>>()?;

        if index.is_single_sample() {
            if let Some(array) = arrays.pop() {
                return Ok(array);
            }
        }
        SampleArray::stack(&arrays)
    }
}

#[cfg(test)]
mod tests {
    use super::super::link_creds::{Creds, ProviderFactory};
    use super::super::media::NpyDecoder;
    use super::*;
    use crate::compression::Compression;
    use crate::index::FrameWindow;
    use crate::keys::FIRST_COMMIT_ID;
    use crate::storage::MemoryProvider;
    use parking_lot::Mutex;

    #[derive(Debug)]
    struct FixedFactory(Arc<MemoryProvider>);

    impl ProviderFactory for FixedFactory {
        fn create(&self, _family: ProviderFamily, _creds: &Creds) -> Result<Arc<dyn StorageProvider>> {
            Ok(self.0.clone())
        }
    }

    /// Decoder that serves a fixed 10-frame clip and records requested windows
    #[derive(Debug, Default)]
    struct RecordingDecoder {
        windows: Mutex<Vec<FrameWindow>>,
    }

    impl RecordingDecoder {
        fn clip() -> SampleArray {
            SampleArray::from_slice(&[10, 2], &(0..20).collect::<Vec<u8>>()).unwrap()
        }
    }

    impl MediaDecoder for RecordingDecoder {
        fn decode(&self, _bytes: &[u8], _path: &str) -> Result<SampleArray> {
            Ok(Self::clip())
        }

        fn probe_shape(&self, _url: &str) -> Result<Vec<usize>> {
            Ok(vec![10, 2])
        }

        fn decode_window(&self, _url: &str, window: FrameWindow) -> Result<SampleArray> {
            self.windows.lock().push(window);
            Self::clip().select(&[DimIndex::Slice {
                start: Some(window.start as i64),
                stop: Some(window.stop as i64),
                step: window.step as i64,
            }])
        }
    }

    fn setup(decoder: Arc<dyn MediaDecoder>, htype: Htype) -> (Arc<MemoryProvider>, LinkedChunkEngine) {
        let remote = Arc::new(MemoryProvider::new());
        let mut creds = LinkCreds::with_factory(Arc::new(FixedFactory(remote.clone())));
        creds.add_creds_key("prod");
        let engine = LinkedChunkEngine::new(
            "links",
            Arc::new(MemoryProvider::new()),
            ChunkConfig::default(),
            Arc::new(creds),
            decoder,
        );
        engine.create_tensor(htype).unwrap();
        (remote, engine)
    }

    #[test]
    fn test_non_linked_sample_rejected_before_write() {
        let (_, mut engine) = setup(Arc::new(NpyDecoder), Htype::Generic);
        let result = engine.extend(vec![
            LinkedSample::new("s3://bucket/a.npy").into(),
            Sample::Text("s3://bucket/b.npy".into()),
        ]);
        assert!(matches!(result, Err(Error::LinkedSampleType("text"))));
        assert_eq!(engine.num_samples().unwrap(), 0);
        assert!(!engine.is_data_cachable());
        assert!(!engine.base().is_data_cachable());
    }

    #[test]
    fn test_remote_fetch_with_creds() {
        let (remote, mut engine) = setup(Arc::new(NpyDecoder), Htype::Generic);
        let array = SampleArray::from_slice(&[2, 2], &[1i16, 2, 3, 4]).unwrap();
        remote
            .put("bucket/a.npy", &Compression::Npy.compress_array(&array).unwrap())
            .unwrap();

        assert_eq!(engine.load_creds_encoder().unwrap(), LoadOutcome::CreatedNew);
        engine
            .extend(vec![
                LinkedSample::with_creds("s3://bucket/a.npy", "prod").into(),
                LinkedSample::new("gs://bucket/a.npy").into(),
            ])
            .unwrap();
        engine.flush().unwrap();

        assert_eq!(engine.get_path(0).unwrap(), "s3://bucket/a.npy");
        assert_eq!(engine.get_creds_key(0).unwrap().as_deref(), Some("prod"));
        assert_eq!(engine.get_creds_key(1).unwrap(), None);
        assert_eq!(engine.creds_encoder().unwrap().rows(), &[(1, 1), (0, 2)]);

        let row = engine.get_basic_sample(1, &[DimIndex::Int(1)]).unwrap();
        assert_eq!(row.as_array().unwrap().to_vec::<i16>().unwrap(), vec![3, 4]);

        engine
            .update_creds(1, &LinkedSample::with_creds("gs://bucket/a.npy", "prod"))
            .unwrap();
        assert_eq!(engine.creds_encoder().unwrap().rows(), &[(1, 2)]);
        assert!(matches!(
            engine.update_creds(0, &LinkedSample::with_creds("x", "dev")),
            Err(Error::UnknownCreds(_))
        ));
    }

    #[test]
    fn test_video_decodes_only_requested_window() {
        let decoder = Arc::new(RecordingDecoder::default());
        let (_, mut engine) = setup(decoder.clone(), Htype::Video);
        engine
            .extend(vec![LinkedSample::new("s3://bucket/clip.mp4").into()])
            .unwrap();

        let frames = engine
            .get_video_sample(
                0,
                &[DimIndex::Slice {
                    start: Some(2),
                    stop: Some(8),
                    step: 3,
                }],
            )
            .unwrap();
        assert_eq!(frames.shape(), &[2, 2]);
        assert_eq!(frames.to_vec::<u8>().unwrap(), vec![4, 5, 10, 11]);

        let frame = engine.get_video_sample(0, &[DimIndex::Int(-1), DimIndex::Int(0)]).unwrap();
        assert_eq!(frame.to_vec::<u8>().unwrap(), vec![18]);

        let windows = decoder.windows.lock();
        assert_eq!(
            windows[0],
            FrameWindow {
                start: 2,
                stop: 8,
                step: 3,
                reverse: false
            }
        );
        assert_eq!(
            windows[1],
            FrameWindow {
                start: 9,
                stop: 10,
                step: 1,
                reverse: false
            }
        );
    }

    #[test]
    fn test_local_link_and_commit_switch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.npy");
        let array = SampleArray::from_vec(vec![1.5f32, 2.5]);
        std::fs::write(&path, Compression::Npy.compress_array(&array).unwrap()).unwrap();

        let (_, mut engine) = setup(Arc::new(NpyDecoder), Htype::Generic);
        engine
            .extend(vec![LinkedSample::new(path.display().to_string()).into()])
            .unwrap();
        let value = engine.numpy(&Index::int(0)).unwrap();
        assert_eq!(value.to_vec::<f32>().unwrap(), vec![1.5, 2.5]);

        engine.checkout("branch").unwrap();
        assert_eq!(engine.num_samples().unwrap(), 0);
        assert_eq!(engine.load_creds_encoder().unwrap(), LoadOutcome::CreatedNew);
        engine.checkout(FIRST_COMMIT_ID).unwrap();
        assert_eq!(engine.creds_encoder().unwrap().num_samples(), 1);
    }
}
