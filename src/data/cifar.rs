//! CIFAR-10 binary format loading.
//!
//! Each batch file contains 10,000 records structured as:
//! ```text
//! [label: u8] [red: 1024×u8] [green: 1024×u8] [blue: 1024×u8]
//! ```
//! Total: 3073 bytes per record, pixels row-major within each channel plane.
//! Images are kept in the planar channel order and scaled to `[0, 1]`; the
//! competitive layer is permutation-invariant over input positions, so no
//! interleaving is needed.

use ndarray::Array2;
use std::fs;
use std::io;
use std::path::Path;

use super::lp_unit_normalize;

/// CIFAR-10 image height.
pub const CIFAR_HEIGHT: usize = 32;
/// CIFAR-10 image width.
pub const CIFAR_WIDTH: usize = 32;
/// CIFAR-10 color channels.
pub const CIFAR_CHANNELS: usize = 3;
/// Flattened pixels per image (32 × 32 × 3 = 3072).
pub const CIFAR_PIXELS: usize = CIFAR_HEIGHT * CIFAR_WIDTH * CIFAR_CHANNELS;
/// Bytes per record (1 label + 3072 pixels).
pub const CIFAR_RECORD_SIZE: usize = 1 + CIFAR_PIXELS;
/// Number of classes.
pub const CIFAR_NUM_CLASSES: usize = 10;

/// A loaded image dataset with flattened samples and labels.
#[derive(Debug, Clone)]
pub struct ImageDataset {
    /// Pixel data, shape `(num_images, CIFAR_PIXELS)`.
    pub images: Array2<f32>,
    /// Class labels, 0-9.
    pub labels: Vec<u8>,
}

impl ImageDataset {
    /// Assemble a dataset from flat sample rows.
    ///
    /// # Errors
    /// Returns an error if the rows are ragged or the label count mismatches.
    pub fn from_rows(rows: Vec<Vec<f32>>, labels: Vec<u8>) -> Result<Self, String> {
        if rows.len() != labels.len() {
            return Err(format!(
                "{} samples but {} labels",
                rows.len(),
                labels.len()
            ));
        }
        let ncols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != ncols) {
            return Err("ragged sample rows".to_string());
        }
        let nrows = rows.len();
        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        let images = Array2::from_shape_vec((nrows, ncols), flat)
            .map_err(|e| format!("Failed to assemble dataset: {e}"))?;
        Ok(Self { images, labels })
    }

    pub fn num_images(&self) -> usize {
        self.images.nrows()
    }

    pub fn image_dim(&self) -> usize {
        self.images.ncols()
    }
}

/// Load a single CIFAR-10 binary batch file.
///
/// Returns pixel rows scaled to `[0, 1]` in planar channel order, plus labels.
///
/// # Errors
///
/// Returns `io::Error` if the file cannot be read or its size is not a
/// multiple of the record size.
pub fn load_cifar10_batch(path: &Path) -> io::Result<(Vec<Vec<f32>>, Vec<u8>)> {
    let data = fs::read(path)?;
    if data.len() % CIFAR_RECORD_SIZE != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "File size {} is not a multiple of record size {}",
                data.len(),
                CIFAR_RECORD_SIZE
            ),
        ));
    }
    let num_records = data.len() / CIFAR_RECORD_SIZE;

    let mut images = Vec::with_capacity(num_records);
    let mut labels = Vec::with_capacity(num_records);

    for record in data.chunks_exact(CIFAR_RECORD_SIZE) {
        labels.push(record[0]);
        let pixels: Vec<f32> = record[1..].iter().map(|&b| f32::from(b) / 255.0).collect();
        images.push(pixels);
    }

    Ok((images, labels))
}

/// Load the full CIFAR-10 training set (5 batch files, 50,000 images).
///
/// # Errors
///
/// Returns `io::Error` if any batch file cannot be read.
pub fn load_cifar10_train(data_dir: &Path) -> io::Result<(Vec<Vec<f32>>, Vec<u8>)> {
    let mut all_images = Vec::new();
    let mut all_labels = Vec::new();
    for batch_num in 1..=5 {
        let batch_path = data_dir.join(format!("data_batch_{batch_num}.bin"));
        let (images, labels) = load_cifar10_batch(&batch_path)?;
        all_images.extend(images);
        all_labels.extend(labels);
    }
    Ok((all_images, all_labels))
}

/// Load the CIFAR-10 test set (10,000 images).
///
/// # Errors
///
/// Returns `io::Error` if the test batch file cannot be read.
pub fn load_cifar10_test(data_dir: &Path) -> io::Result<(Vec<Vec<f32>>, Vec<u8>)> {
    load_cifar10_batch(&data_dir.join("test_batch.bin"))
}

/// Load the training set and scale every image to unit Lp norm.
///
/// This is the preprocessing the competitive layer assumes of its inputs.
///
/// # Errors
///
/// Returns an error for unreadable files or malformed records.
pub fn load_lp_normalized_train(data_dir: &Path, p: f32) -> Result<ImageDataset, String> {
    let (mut images, labels) =
        load_cifar10_train(data_dir).map_err(|e| format!("Failed to load CIFAR-10: {e}"))?;
    lp_unit_normalize(&mut images, p);
    ImageDataset::from_rows(images, labels)
}
