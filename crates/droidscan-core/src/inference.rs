//! ONNX model loading and inference via the `ort` crate.
//!
//! The trained convolutional classifier is consumed as an exported ONNX
//! graph whose input is named `input` (shape 1x16384x1x3, f32, pixels
//! normalized to [0, 1]) and whose output is named `output` (a single
//! maliciousness score).

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;

use crate::encode::{resample_column, CompositeImage, RESAMPLED_ROWS};

pub struct MalwareModel {
    session: Mutex<Session>,
}

impl MalwareModel {
    /// Load an ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self> {
        let session = Session::builder()?
            .with_intra_threads(4)?
            .commit_from_file(model_path)?;

        Ok(Self {
            session: Mutex::new(session),
        })
    }

    /// Run inference on one input tensor of shape (1, 16384, 1, 3).
    /// Returns a maliciousness score in [0.0, 1.0].
    pub fn predict(&self, input: &Array4<f32>) -> Result<f32> {
        let input_tensor = TensorRef::from_array_view(input)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("lock error: {e}"))?;
        let outputs = session.run(ort::inputs!["input" => input_tensor])?;

        let output_array = outputs["output"].try_extract_array::<f32>()?;
        let score = output_array.iter().next().copied().unwrap_or(0.0);

        Ok(score)
    }

    /// Score a composite PNG on disk.
    pub fn score_image(&self, path: &Path) -> Result<f32> {
        let tensor = load_image_tensor(path)?;
        self.predict(&tensor)
    }

    /// Score an in-memory composite without a PNG round trip.
    pub fn score_composite(&self, image: &CompositeImage) -> Result<f32> {
        self.predict(&composite_to_tensor(image))
    }
}

/// Decode a composite PNG into the network input tensor.
pub fn load_image_tensor(path: &Path) -> Result<Array4<f32>> {
    let img = image::open(path)
        .with_context(|| format!("cannot read image {}", path.display()))?
        .to_rgb8();
    image_to_tensor(&img)
}

/// Convert a 1-pixel-wide RGB column image to (1, 16384, 1, 3) f32 with
/// pixel/255 normalization. Columns of a different height are resampled
/// to the canonical row count first, so images produced at another
/// resolution still feed the network.
pub fn image_to_tensor(img: &RgbImage) -> Result<Array4<f32>> {
    anyhow::ensure!(
        img.width() == 1 && img.height() > 0,
        "expected a 1-pixel-wide column image, got {}x{}",
        img.width(),
        img.height()
    );

    let rows = img.height() as usize;
    let mut tensor = Array4::<f32>::zeros((1, RESAMPLED_ROWS, 1, 3));
    for channel in 0..3 {
        let column: Vec<u8> = (0..rows)
            .map(|row| img.get_pixel(0, row as u32).0[channel])
            .collect();
        let column = if rows == RESAMPLED_ROWS {
            column
        } else {
            resample_column(&column, RESAMPLED_ROWS)
        };
        for (row, &value) in column.iter().enumerate() {
            tensor[[0, row, 0, channel]] = value as f32 / 255.0;
        }
    }
    Ok(tensor)
}

/// Network input tensor straight from an in-memory composite.
pub fn composite_to_tensor(image: &CompositeImage) -> Array4<f32> {
    let data = image.data();
    Array4::from_shape_fn((1, RESAMPLED_ROWS, 1, 3), |(_, row, _, channel)| {
        data[[row, 0, channel]] as f32 / 255.0
    })
}
