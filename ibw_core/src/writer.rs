use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::array::TypedArray;
use crate::endian::{normalize_components, ByteOrder};
use crate::error::{IgorError, Result};
use crate::format::{to_fixed, FormatVersion, MAX_DIMS, MAX_UNIT_CHARS, TAIL_SIZE_V5};
use crate::header::{BinHeader, BinHeader5, WaveHeader, WaveHeader5, WaveHeaders};
use crate::note;

/// Options for writing a wave file.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Name the wave after the destination file (without extension).
    pub autoname: bool,
    /// Create missing parent directories of the destination.
    pub autodir: bool,
    /// Note text to store instead of one generated from the array's info.
    pub note: Option<String>,
    /// Byte order of the written file.
    pub byte_order: ByteOrder,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            autoname: true,
            autodir: true,
            note: None,
            byte_order: ByteOrder::native(),
        }
    }
}

/// Encode `array` as a version 5 wave.
///
/// # Layout written
/// ```text
/// [BinHeader5: 64 bytes]
/// [WaveHeader5 without wData: 320 bytes]   ← checksum covers these 384 bytes
/// [data, column-major]
/// [note] [extended data units] [extended dimension units × 4]
/// ```
/// Returns the number of bytes written.
pub fn write_to<W: Write + ?Sized>(
    array: &TypedArray,
    w: &mut W,
    opts: &WriteOptions,
) -> Result<u64> {
    write_named(array, &array.name, w, opts)
}

/// Write `array` to the file at `path`, overwriting it.
///
/// With `autoname` the wave takes the file's base name; with `autodir` the
/// parent directories are created first (existing ones are fine).
pub fn write_path(array: &TypedArray, path: impl AsRef<Path>, opts: &WriteOptions) -> Result<u64> {
    let path = path.as_ref();
    let write = || -> Result<u64> {
        if opts.autodir {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }
        }
        let name = match path.file_stem() {
            Some(stem) if opts.autoname => stem.to_string_lossy().into_owned(),
            _ => array.name.clone(),
        };
        let mut out = BufWriter::new(File::create(path)?);
        let written = write_named(array, &name, &mut out, opts)?;
        out.flush()?;
        Ok(written)
    };
    let written = write().map_err(|e| e.at_path(path))?;
    tracing::debug!(path = %path.display(), bytes = written, "wrote wave");
    Ok(written)
}

fn write_named<W: Write + ?Sized>(
    array: &TypedArray,
    name: &str,
    w: &mut W,
    opts: &WriteOptions,
) -> Result<u64> {
    if array.shape.len() > MAX_DIMS {
        return Err(IgorError::format(format!(
            "{} is too many dimensions (at most {MAX_DIMS})",
            array.shape.len()
        )));
    }
    let points = array.len();
    let expected = points * array.element_type.size();
    if array.as_bytes().len() != expected {
        return Err(IgorError::SizeMismatch {
            declared: array.as_bytes().len(),
            points,
            expected,
        });
    }

    let type_code = match array.element_type.code() {
        Some(code) => code,
        None => {
            tracing::warn!(
                element_type = array.element_type.name(),
                "no wave type code for element type, writing type 0"
            );
            0
        }
    };

    let mut wave = WaveHeader5 {
        npnts: to_i32(points, "point count")?,
        type_code,
        bname: to_fixed(name),
        ..WaveHeader5::default()
    };
    let mut bin = BinHeader5::default();
    let mut trailer = Vec::new();

    // sections after the data, in file order
    let note_text = match &opts.note {
        Some(text) => text.clone(),
        None => note::generate(&array.info),
    };
    bin.note_size = to_i32(note_text.len(), "note")?;
    trailer.extend_from_slice(note_text.as_bytes());

    if fits_fixed(&array.units) {
        wave.data_units = to_fixed(&array.units);
    } else {
        bin.data_e_units_size = to_i32(array.units.len(), "data units")?;
        trailer.extend_from_slice(array.units.as_bytes());
    }

    for (d, &extent) in array.shape.iter().enumerate() {
        wave.n_dim[d] = to_i32(extent, "dimension")?;
        if let Some(axis) = array.axes.get(d) {
            wave.sf_a[d] = axis.delta;
            wave.sf_b[d] = axis.offset;
            if fits_fixed(&axis.units) {
                wave.dim_units[d] = to_fixed(&axis.units);
            } else {
                bin.dim_e_units_size[d] = to_i32(axis.units.len(), "dimension units")?;
            }
        }
    }
    for d in 0..array.shape.len() {
        if bin.dim_e_units_size[d] > 0 {
            trailer.extend_from_slice(array.axes[d].units.as_bytes());
        }
    }

    if let Some((top, bottom)) = array.source.as_ref().and_then(|s| s.full_scale) {
        wave.fs_valid = 1;
        wave.top_full_scale = top;
        wave.bot_full_scale = bottom;
    }

    let layout = FormatVersion::V5.layout();
    bin.wfm_size = to_i32(layout.wfm_overhead() + expected, "wave")?;

    let mut headers = WaveHeaders::new(BinHeader::V5(bin), WaveHeader::V5(wave), opts.byte_order)?;
    headers.seal();
    let header_bytes = headers.encode();

    let mut data = array.as_bytes().to_vec();
    // swapping is symmetric, so this also converts host to file order
    normalize_components(&mut data, array.element_type.component_size(), opts.byte_order);

    // the wData field is not written; data follows the 384 checksummed bytes
    w.write_all(&header_bytes[..header_bytes.len() - TAIL_SIZE_V5])?;
    w.write_all(&data)?;
    w.write_all(&trailer)?;
    let mut written = header_bytes.len() - TAIL_SIZE_V5 + data.len() + trailer.len();

    // readers take the full wave header, wData included, in one read
    let pad = header_bytes.len().saturating_sub(written);
    if pad > 0 {
        w.write_all(&vec![0u8; pad])?;
        written += pad;
    }
    Ok(written as u64)
}

fn fits_fixed(units: &str) -> bool {
    units.len() <= MAX_UNIT_CHARS
}

fn to_i32(n: usize, what: &str) -> Result<i32> {
    i32::try_from(n)
        .map_err(|_| IgorError::format(format!("{what} size {n} does not fit the header")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::checksum;

    #[test]
    fn header_checksum_span_sums_to_zero() {
        let a = TypedArray::from_vec(vec![4], vec![1.0f64, 2.0, 3.0, 4.0])
            .unwrap()
            .with_name("w");
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let mut out = Vec::new();
            let opts = WriteOptions {
                byte_order: order,
                ..WriteOptions::default()
            };
            let n = write_to(&a, &mut out, &opts).unwrap();
            assert_eq!(n as usize, out.len());
            assert_eq!(checksum(&out, order, 0, 384), 0);
            // wfmSize = 320 + 32
            assert_eq!(order.read_i32(&out, 4), 352);
        }
    }

    #[test]
    fn tiny_waves_are_padded_to_the_full_header() {
        let a = TypedArray::from_vec(vec![1], vec![-7i8]).unwrap().with_name("tiny");
        let mut out = Vec::new();
        let opts = WriteOptions {
            note: Some(String::new()),
            ..WriteOptions::default()
        };
        let n = write_to(&a, &mut out, &opts).unwrap();
        assert_eq!(n, 388);
        assert_eq!(out.len(), 388);
        let back = crate::reader::read_from(&mut &out[..], &crate::ReadOptions::default()).unwrap();
        assert_eq!(back.values::<i8>().unwrap(), vec![-7]);
    }

    #[test]
    fn long_units_go_to_extended_sections() {
        let mut a = TypedArray::from_vec(vec![2, 2], vec![0u16; 4]).unwrap();
        a.units = "counts".into();
        a.axes[1].units = "degrees".into();
        a.axes[0].units = "eV".into();
        let mut out = Vec::new();
        let opts = WriteOptions {
            byte_order: ByteOrder::Little,
            note: Some(String::new()),
            ..WriteOptions::default()
        };
        write_to(&a, &mut out, &opts).unwrap();
        // dataEUnitsSize at 16, dimEUnitsSize[1] at 24
        assert_eq!(ByteOrder::Little.read_i32(&out, 16), 6);
        assert_eq!(ByteOrder::Little.read_i32(&out, 20), 0);
        assert_eq!(ByteOrder::Little.read_i32(&out, 24), 7);
        assert!(out.ends_with(b"countsdegrees"));
    }

    #[test]
    fn autoname_and_autodir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/scan_042.ibw");
        let a = TypedArray::from_vec(vec![1], vec![5i32]).unwrap().with_name("ignored");
        write_path(&a, &path, &WriteOptions::default()).unwrap();
        let bytes = fs::read(&path).unwrap();
        // bname starts at 64 + 28
        assert_eq!(&bytes[92..101], b"scan_042\0");

        // rewriting into the existing directory is fine
        let named = WriteOptions {
            autoname: false,
            ..WriteOptions::default()
        };
        write_path(&a, &path, &named).unwrap();
        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[92..100], b"ignored\0");
    }

    #[test]
    fn missing_directory_without_autodir_fails_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope/w.ibw");
        let a = TypedArray::from_vec(vec![1], vec![5i32]).unwrap();
        let opts = WriteOptions {
            autodir: false,
            ..WriteOptions::default()
        };
        let err = write_path(&a, &path, &opts).unwrap_err();
        assert!(err.to_string().contains("w.ibw"));
    }
}
