//! Importing platform hardware buffers as textures
//!
//! A [`HardwareBufferImageGenerator`] wraps one hardware buffer and lazily
//! imports it into whichever GPU context asks. The imported texture is cached
//! for the context that made it. Textures must be freed on their owning
//! context's thread, so instead of dropping a stale texture the generator
//! posts it to a [`ReleaseQueue`] that the owning context drains.

use std::sync::{Arc, Mutex, PoisonError};

use covpath_paint::IRect;

use crate::error::{ImportError, Result};

pub const HARDWARE_BUFFER_FORMAT_RGBA8: u32 = 1;
pub const HARDWARE_BUFFER_FORMAT_RGBA_F16: u32 = 0x16;
pub const HARDWARE_BUFFER_FORMAT_RGB565: u32 = 4;

/// Pixel layout an imported texture is wrapped with
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportPixelConfig {
    Rgba8,
    RgbaHalf,
    Rgb565,
}

impl ImportPixelConfig {
    pub fn from_format(format: u32) -> Option<Self> {
        match format {
            HARDWARE_BUFFER_FORMAT_RGBA8 => Some(Self::Rgba8),
            HARDWARE_BUFFER_FORMAT_RGBA_F16 => Some(Self::RgbaHalf),
            HARDWARE_BUFFER_FORMAT_RGB565 => Some(Self::Rgb565),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HardwareBufferDesc {
    pub format: u32,
    pub width: u32,
    pub height: u32,
}

/// Identity of a GPU context
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendApi {
    /// GL-like APIs that can bind a hardware buffer as an external image
    Gl,
    Vulkan,
    Metal,
    Other,
}

/// The context-side half of an import
pub trait TextureImporter {
    type Texture: Clone;

    fn context_id(&self) -> ContextId;
    fn backend(&self) -> BackendApi;
    fn is_abandoned(&self) -> bool;

    /// Wrap the hardware buffer as a texture owned by this context.
    fn import(
        &mut self,
        desc: &HardwareBufferDesc,
        config: ImportPixelConfig,
    ) -> Result<Self::Texture>;

    /// Copy `subset` of `source` into a new texture, with a mip chain if
    /// `mipmapped`.
    fn copy(&mut self, source: &Self::Texture, subset: IRect, mipmapped: bool)
        -> Result<Self::Texture>;

    fn is_mipmapped(&self, texture: &Self::Texture) -> bool;
}

#[derive(Debug)]
struct ReleaseRequest<T> {
    owner: ContextId,
    texture: T,
}

/// Textures waiting to be freed by the context that owns them
///
/// Cloning shares the queue. Any thread may post; each context drains only
/// its own entries.
#[derive(Debug)]
pub struct ReleaseQueue<T> {
    pending: Arc<Mutex<Vec<ReleaseRequest<T>>>>,
}

impl<T> Clone for ReleaseQueue<T> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<T> Default for ReleaseQueue<T> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T> ReleaseQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&self, owner: ContextId, texture: T) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ReleaseRequest { owner, texture });
    }

    /// Remove and return the textures owned by `context`, oldest first.
    pub fn drain_for(&self, context: ContextId) -> Vec<T> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let (mine, others): (Vec<_>, Vec<_>) =
            pending.drain(..).partition(|request| request.owner == context);
        *pending = others;
        mine.into_iter().map(|request| request.texture).collect()
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct CachedTexture<T> {
    texture: T,
    owner: ContextId,
}

/// Lazily imports a hardware buffer, caching the texture per owning context
#[derive(Debug)]
pub struct HardwareBufferImageGenerator<T> {
    desc: HardwareBufferDesc,
    config: ImportPixelConfig,
    cached: Option<CachedTexture<T>>,
    releases: ReleaseQueue<T>,
}

impl<T: Clone> HardwareBufferImageGenerator<T> {
    /// `None` if the buffer's format can't be imported.
    pub fn new(desc: HardwareBufferDesc, releases: ReleaseQueue<T>) -> Option<Self> {
        let Some(config) = ImportPixelConfig::from_format(desc.format) else {
            tracing::debug!("unsupported hardware buffer format {:#x}", desc.format);
            return None;
        };
        Some(Self {
            desc,
            config,
            cached: None,
            releases,
        })
    }

    pub fn desc(&self) -> &HardwareBufferDesc {
        &self.desc
    }

    pub fn pixel_config(&self) -> ImportPixelConfig {
        self.config
    }

    /// Context owning the cached texture, if any
    pub fn owning_context(&self) -> Option<ContextId> {
        self.cached.as_ref().map(|c| c.owner)
    }

    /// Whether `importer`'s context could import this buffer. There is no
    /// CPU fallback: hardware buffers may be swizzled.
    pub fn is_valid<I>(&self, importer: Option<&I>) -> bool
    where
        I: TextureImporter<Texture = T>,
    {
        importer.is_some_and(|i| i.backend() == BackendApi::Gl)
    }

    fn full_rect(&self) -> IRect {
        IRect::from_wh(self.desc.width as i32, self.desc.height as i32)
    }

    fn release_cached(&mut self) {
        if let Some(cached) = self.cached.take() {
            self.releases.post(cached.owner, cached.texture);
        }
    }

    fn replace_cached(&mut self, texture: T, owner: ContextId) {
        self.release_cached();
        self.cached = Some(CachedTexture { texture, owner });
    }

    /// The texture for `importer`'s context, importing it on first use.
    pub fn make_texture<I>(&mut self, importer: &mut I) -> Result<T>
    where
        I: TextureImporter<Texture = T>,
    {
        if importer.is_abandoned() {
            return Err(ImportError::ContextAbandoned);
        }
        if importer.backend() != BackendApi::Gl {
            return Err(ImportError::UnsupportedBackend);
        }

        let context = importer.context_id();
        if let Some(cached) = &self.cached {
            if cached.owner == context {
                return Ok(cached.texture.clone());
            }
        }

        let texture = importer.import(&self.desc, self.config)?;
        self.replace_cached(texture.clone(), context);
        Ok(texture)
    }

    /// A texture of `subset`. Full-size requests reuse the imported texture
    /// unless mips are needed and missing; a full-size mipped copy becomes
    /// the new cached texture.
    pub fn generate_texture<I>(
        &mut self,
        importer: &mut I,
        subset: IRect,
        mipmapped: bool,
    ) -> Result<T>
    where
        I: TextureImporter<Texture = T>,
    {
        let base = self.make_texture(importer)?;
        let full = subset == self.full_rect();
        if full && (!mipmapped || importer.is_mipmapped(&base)) {
            return Ok(base);
        }

        let copy = importer.copy(&base, subset, mipmapped)?;
        if full {
            self.replace_cached(copy.clone(), importer.context_id());
        }
        Ok(copy)
    }
}

impl<T> Drop for HardwareBufferImageGenerator<T> {
    fn drop(&mut self) {
        if let Some(cached) = self.cached.take() {
            self.releases.post(cached.owner, cached.texture);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct FakeTexture {
        id: u32,
        mipped: bool,
    }

    struct FakeImporter {
        context: ContextId,
        backend: BackendApi,
        abandoned: bool,
        next_id: u32,
        imports: usize,
        copies: usize,
    }

    impl FakeImporter {
        fn gl(context: u32) -> Self {
            Self {
                context: ContextId(context),
                backend: BackendApi::Gl,
                abandoned: false,
                next_id: context * 100,
                imports: 0,
                copies: 0,
            }
        }
    }

    impl TextureImporter for FakeImporter {
        type Texture = FakeTexture;

        fn context_id(&self) -> ContextId {
            self.context
        }

        fn backend(&self) -> BackendApi {
            self.backend
        }

        fn is_abandoned(&self) -> bool {
            self.abandoned
        }

        fn import(
            &mut self,
            _desc: &HardwareBufferDesc,
            _config: ImportPixelConfig,
        ) -> Result<FakeTexture> {
            self.imports += 1;
            self.next_id += 1;
            Ok(FakeTexture {
                id: self.next_id,
                mipped: false,
            })
        }

        fn copy(
            &mut self,
            _source: &FakeTexture,
            _subset: IRect,
            mipmapped: bool,
        ) -> Result<FakeTexture> {
            self.copies += 1;
            self.next_id += 1;
            Ok(FakeTexture {
                id: self.next_id,
                mipped: mipmapped,
            })
        }

        fn is_mipmapped(&self, texture: &FakeTexture) -> bool {
            texture.mipped
        }
    }

    fn desc(format: u32) -> HardwareBufferDesc {
        HardwareBufferDesc {
            format,
            width: 64,
            height: 32,
        }
    }

    #[test]
    fn test_unknown_format_rejected() {
        let queue = ReleaseQueue::<FakeTexture>::new();
        assert!(HardwareBufferImageGenerator::new(desc(0x2b), queue.clone()).is_none());
        assert!(HardwareBufferImageGenerator::new(desc(HARDWARE_BUFFER_FORMAT_RGB565), queue).is_some());
    }

    #[test]
    fn test_same_context_reuses_texture() {
        let queue = ReleaseQueue::new();
        let mut generator =
            HardwareBufferImageGenerator::new(desc(HARDWARE_BUFFER_FORMAT_RGBA8), queue.clone())
                .unwrap();
        let mut importer = FakeImporter::gl(1);
        let a = generator.make_texture(&mut importer).unwrap();
        let b = generator.make_texture(&mut importer).unwrap();
        assert_eq!(a, b);
        assert_eq!(importer.imports, 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_new_context_releases_old_texture() {
        let queue = ReleaseQueue::new();
        let mut generator =
            HardwareBufferImageGenerator::new(desc(HARDWARE_BUFFER_FORMAT_RGBA8), queue.clone())
                .unwrap();
        let first = generator.make_texture(&mut FakeImporter::gl(1)).unwrap();
        generator.make_texture(&mut FakeImporter::gl(2)).unwrap();
        assert_eq!(generator.owning_context(), Some(ContextId(2)));
        assert!(queue.drain_for(ContextId(2)).is_empty());
        assert_eq!(queue.drain_for(ContextId(1)), vec![first]);
    }

    #[test]
    fn test_unsupported_contexts() {
        let queue = ReleaseQueue::new();
        let mut generator =
            HardwareBufferImageGenerator::new(desc(HARDWARE_BUFFER_FORMAT_RGBA_F16), queue)
                .unwrap();
        let mut vulkan = FakeImporter::gl(1);
        vulkan.backend = BackendApi::Vulkan;
        assert_eq!(
            generator.make_texture(&mut vulkan),
            Err(ImportError::UnsupportedBackend)
        );
        assert!(!generator.is_valid(Some(&vulkan)));
        assert!(!generator.is_valid::<FakeImporter>(None));

        let mut abandoned = FakeImporter::gl(2);
        abandoned.abandoned = true;
        assert_eq!(
            generator.make_texture(&mut abandoned),
            Err(ImportError::ContextAbandoned)
        );
    }

    #[test]
    fn test_generate_full_and_subset() {
        let queue = ReleaseQueue::new();
        let mut generator =
            HardwareBufferImageGenerator::new(desc(HARDWARE_BUFFER_FORMAT_RGBA8), queue.clone())
                .unwrap();
        let mut importer = FakeImporter::gl(1);
        let full = IRect::from_wh(64, 32);

        let base = generator.generate_texture(&mut importer, full, false).unwrap();
        assert_eq!(importer.copies, 0);

        let subset = generator
            .generate_texture(&mut importer, IRect::new(0, 0, 16, 16), false)
            .unwrap();
        assert_ne!(subset, base);
        assert_eq!(importer.copies, 1);
        assert!(queue.is_empty());

        // A full mipped copy replaces the cache and releases the base.
        let mipped = generator.generate_texture(&mut importer, full, true).unwrap();
        assert!(mipped.mipped);
        assert_eq!(queue.drain_for(ContextId(1)), vec![base]);
        let again = generator.generate_texture(&mut importer, full, true).unwrap();
        assert_eq!(again, mipped);
    }

    #[test]
    fn test_drop_posts_cached_texture() {
        let queue = ReleaseQueue::new();
        let texture = {
            let mut generator = HardwareBufferImageGenerator::new(
                desc(HARDWARE_BUFFER_FORMAT_RGBA8),
                queue.clone(),
            )
            .unwrap();
            generator.make_texture(&mut FakeImporter::gl(3)).unwrap()
        };
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain_for(ContextId(3)), vec![texture]);
    }
}
