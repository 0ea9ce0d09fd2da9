//! Background image loading for lookup tables.
//!
//! A load decodes on a worker thread and reports back through a one-shot
//! channel. The render thread polls the [`PendingTexture`] once per frame and
//! uploads the image itself when it is ready, so nothing touches the backend
//! off-thread.

use std::path::{Path, PathBuf};
use std::thread;

use crossbeam_channel::{Receiver, TryRecvError};
use image::{Rgba, RgbaImage};

use crate::kernels::{LUT_LEVELS, LUT_SIZE, lut_texel};

/// Errors from loading an image asset.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("loader thread went away before reporting")]
    Disconnected,
}

/// State of a pending load.
#[derive(Debug)]
pub enum Poll {
    Pending,
    Ready(RgbaImage),
    Failed(AssetError),
}

/// An image being decoded in the background.
///
/// Poll until it returns [`Poll::Ready`] or [`Poll::Failed`], then drop it;
/// the result is delivered exactly once.
#[derive(Debug)]
pub struct PendingTexture {
    path: PathBuf,
    receiver: Receiver<Result<RgbaImage, AssetError>>,
}

impl PendingTexture {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Non-blocking check for the decoded image.
    pub fn poll(&mut self) -> Poll {
        match self.receiver.try_recv() {
            Ok(Ok(image)) => Poll::Ready(image),
            Ok(Err(err)) => Poll::Failed(err),
            Err(TryRecvError::Empty) => Poll::Pending,
            Err(TryRecvError::Disconnected) => Poll::Failed(AssetError::Disconnected),
        }
    }

    /// Blocks until the load finishes.
    pub fn wait(self) -> Result<RgbaImage, AssetError> {
        self.receiver.recv().map_err(|_| AssetError::Disconnected)?
    }
}

/// Starts image loads relative to an asset root.
#[derive(Clone, Debug)]
pub struct AssetLoader {
    root: PathBuf,
}

impl Default for AssetLoader {
    fn default() -> Self {
        Self::new(".")
    }
}

impl AssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `path` against the root unless it is absolute.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    /// Starts decoding `path` on a worker thread.
    pub fn load(&self, path: impl AsRef<Path>) -> PendingTexture {
        let path = self.resolve(path);
        let (sender, receiver) = crossbeam_channel::bounded(1);

        let worker_path = path.clone();
        let spawned = thread::Builder::new()
            .name("asset-loader".into())
            .spawn(move || {
                let _ = sender.send(decode(&worker_path));
            });
        if let Err(err) = spawned {
            log::warn!("could not start loader thread for {}: {err}", path.display());
        } else {
            log::debug!("loading {}", path.display());
        }

        PendingTexture { path, receiver }
    }

    /// A load that is already complete, for images built in memory.
    pub fn from_image(image: RgbaImage) -> PendingTexture {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        let _ = sender.send(Ok(image));
        PendingTexture {
            path: PathBuf::from("<memory>"),
            receiver,
        }
    }
}

fn decode(path: &Path) -> Result<RgbaImage, AssetError> {
    let bytes = std::fs::read(path).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let image = image::load_from_memory(&bytes).map_err(|source| AssetError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(image.to_rgba8())
}

/// The packed lookup table that maps every colour to the center of its own
/// quantization cell.
///
/// Grading through it only applies the 40-level quantization, which makes it
/// a useful neutral table when no graded LUT image is available.
pub fn identity_lut() -> RgbaImage {
    let mut lut = RgbaImage::from_pixel(LUT_SIZE, LUT_SIZE, Rgba([0, 0, 0, 255]));
    let levels = LUT_LEVELS;
    let level = |q: u32| (((q as f32 + 0.5) / levels as f32) * 255.0).round() as u8;
    for index in 0..levels * levels * levels {
        let (r, g, b) = (index / (levels * levels), (index / levels) % levels, index % levels);
        let texel = lut_texel(index);
        lut.put_pixel(texel.x, texel.y, Rgba([level(r), level(g), level(b), 255]));
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::lut_index;
    use glam::Vec3;

    #[test]
    fn from_image_is_ready_once() {
        let mut pending = AssetLoader::from_image(RgbaImage::new(2, 2));
        assert!(matches!(pending.poll(), Poll::Ready(img) if img.dimensions() == (2, 2)));
        assert!(matches!(pending.poll(), Poll::Failed(AssetError::Disconnected)));
    }

    #[test]
    fn missing_file_fails_with_io() {
        let loader = AssetLoader::new(std::env::temp_dir());
        let pending = loader.load("screenfx-definitely-missing.png");
        assert!(matches!(pending.wait(), Err(AssetError::Io { .. })));
    }

    #[test]
    fn loads_png_from_disk() {
        let dir = std::env::temp_dir().join(format!("screenfx-assets-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let lut = identity_lut();
        lut.save(dir.join("identity.png")).unwrap();

        let loader = AssetLoader::new(&dir);
        let image = loader.load("identity.png").wait().unwrap();
        assert_eq!(image, lut);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn identity_lut_maps_cells_to_themselves() {
        let lut = identity_lut();
        for color in [Vec3::ZERO, Vec3::new(0.3, 0.6, 0.9), Vec3::ONE] {
            let index = lut_index(color);
            let texel = lut_texel(index);
            let p = lut.get_pixel(texel.x, texel.y).0;
            let graded = Vec3::new(p[0] as f32, p[1] as f32, p[2] as f32) / 255.0;
            assert_eq!(lut_index(graded), index);
        }
    }
}
