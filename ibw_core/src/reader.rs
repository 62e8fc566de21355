use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::array::{element_count, AxisScale, SourceInfo, TypedArray};
use crate::endian::{normalize_components, read_fully};
use crate::error::{IgorError, Result};
use crate::format::{fixed_str, ElementType, DATA_PADDING_V2, MAX_DIMS};
use crate::header::{read_headers, BinHeader, WaveHeader, WaveHeaders};
use crate::note::{self, NoteMode};

/// Options for decoding a wave.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub note_mode: NoteMode,
}

impl ReadOptions {
    pub fn with_note_mode(note_mode: NoteMode) -> Self {
        Self { note_mode }
    }
}

/// Everything stored after the wave data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostData {
    pub note: String,
    pub formula: String,
    /// Extended data units (version 5).
    pub data_e_units: String,
    /// Extended units per dimension (version 5).
    pub dim_e_units: Vec<String>,
    /// Labels per dimension (version 5).
    pub dim_labels: Vec<Vec<String>>,
}

/// Decode a complete wave from a stream positioned at its first byte.
///
/// # Read sequence
/// 1. Headers: version and byte order, checksum, both header structures.
/// 2. Data: the `wData` tail of the wave header plus the rest of the data
///    block, converted to host byte order.
/// 3. Trailer: note, formula, extended units and labels, depending on the
///    version.
pub fn read_from<R: Read + ?Sized>(r: &mut R, opts: &ReadOptions) -> Result<TypedArray> {
    let headers = read_headers(r)?;
    let (mut array, overhang) = read_data(r, &headers)?;
    let post = {
        // tail bytes beyond the data belong to the trailer
        let mut rest = overhang.as_slice().chain(&mut *r);
        read_post_data(&mut rest, &headers)?
    };
    apply_post_data(&mut array, &headers, post, opts);
    Ok(array)
}

/// Decode the wave stored in the file at `path`.
pub fn read_path(path: impl AsRef<Path>, opts: &ReadOptions) -> Result<TypedArray> {
    let path = path.as_ref();
    let read = || -> Result<TypedArray> {
        let mut file = BufReader::new(File::open(path)?);
        read_from(&mut file, opts)
    };
    let mut array = read().map_err(|e| e.at_path(path))?;
    if let Some(source) = array.source.as_mut() {
        source.path = Some(std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()));
    }
    tracing::debug!(path = %path.display(), name = %array.name, "read wave");
    Ok(array)
}

/// Shape of the data block as declared by the wave header.
pub fn declared_shape(wave: &WaveHeader) -> Result<Vec<usize>> {
    let npnts = usize::try_from(wave.npnts())
        .map_err(|_| IgorError::format(format!("negative point count {}", wave.npnts())))?;
    let shape = match wave {
        WaveHeader::V5(h) => {
            let dims: Vec<usize> = h
                .n_dim
                .iter()
                .filter(|&&n| n > 0)
                .map(|&n| n as usize)
                .collect();
            if dims.is_empty() {
                vec![npnts]
            } else {
                dims
            }
        }
        WaveHeader::V2(_) => vec![npnts],
    };
    let product = element_count(&shape)?;
    if product != npnts {
        return Err(IgorError::format(format!(
            "dimensions {shape:?} hold {product} points, header declares {npnts}"
        )));
    }
    Ok(shape)
}

/// Read the data block that follows the headers.
///
/// Returns the array (named, axis-scaled, host byte order) and the tail bytes
/// that lie beyond the data block. Those are non-empty only when the data is
/// shorter than the `wData` field and must be read before the rest of the
/// trailer.
pub fn read_data<R: Read + ?Sized>(
    r: &mut R,
    headers: &WaveHeaders,
) -> Result<(TypedArray, Vec<u8>)> {
    let element_type = ElementType::from_code(headers.wave.type_code())?;
    let shape = declared_shape(&headers.wave)?;
    let points = element_count(&shape)?;
    let expected = points
        .checked_mul(element_type.size())
        .ok_or_else(|| IgorError::format(format!("{points} points overflow the data size")))?;
    let declared = headers.wave_data_size()?;
    if declared != expected {
        return Err(IgorError::SizeMismatch {
            declared,
            points,
            expected,
        });
    }

    let tail = headers.wave.tail();
    let from_tail = tail.len().min(declared);
    let mut data = Vec::with_capacity(declared);
    data.extend_from_slice(&tail[..from_tail]);
    data.resize(declared, 0);
    read_fully(r, &mut data[from_tail..], "wave data")?;
    normalize_components(&mut data, element_type.component_size(), headers.byte_order);
    let overhang = tail[from_tail..].to_vec();

    let mut array = TypedArray::from_bytes(element_type, shape, data)?;
    array.name = headers.name();
    match &headers.wave {
        WaveHeader::V5(h) => {
            array.units = fixed_str(&h.data_units);
            for (d, axis) in array.axes.iter_mut().enumerate() {
                axis.delta = h.sf_a[d];
                axis.offset = h.sf_b[d];
                axis.units = fixed_str(&h.dim_units[d]);
            }
        }
        WaveHeader::V2(h) => {
            array.units = fixed_str(&h.data_units);
            if let Some(axis) = array.axes.first_mut() {
                *axis = AxisScale {
                    delta: h.hs_a,
                    offset: h.hs_b,
                    units: fixed_str(&h.x_units),
                    labels: Vec::new(),
                };
            }
        }
    }
    Ok((array, overhang))
}

/// Read the version-dependent trailer that follows the data block.
pub fn read_post_data<R: Read + ?Sized>(r: &mut R, headers: &WaveHeaders) -> Result<PostData> {
    let mut post = PostData::default();
    match &headers.bin {
        BinHeader::V1(_) => {}
        BinHeader::V2(h) => {
            skip(r, DATA_PADDING_V2, "data padding")?;
            post.note = read_text(r, h.note_size, "note")?;
        }
        BinHeader::V3(h) => {
            skip(r, DATA_PADDING_V2, "data padding")?;
            post.note = read_text(r, h.note_size, "note")?;
            post.formula = read_text(r, h.formula_size, "formula")?;
        }
        BinHeader::V5(h) => {
            post.formula = read_text(r, h.formula_size, "formula")?;
            post.note = read_text(r, h.note_size, "note")?;
            post.data_e_units = read_text(r, h.data_e_units_size, "extended data units")?;
            for size in h.dim_e_units_size {
                post.dim_e_units.push(read_text(r, size, "extended dimension units")?);
            }
            for size in h.dim_labels_size {
                let raw = read_sized(r, size, "dimension labels")?;
                let labels = raw
                    .split(|&b| b == 0)
                    .filter(|l| !l.is_empty())
                    .map(|l| String::from_utf8_lossy(l).into_owned())
                    .collect();
                post.dim_labels.push(labels);
            }
        }
    }
    Ok(post)
}

fn apply_post_data(
    array: &mut TypedArray,
    headers: &WaveHeaders,
    post: PostData,
    opts: &ReadOptions,
) {
    if !post.data_e_units.is_empty() {
        array.units = post.data_e_units.clone();
    }
    for (d, axis) in array.axes.iter_mut().enumerate().take(MAX_DIMS) {
        if let Some(units) = post.dim_e_units.get(d).filter(|u| !u.is_empty()) {
            axis.units = units.clone();
        }
        if let Some(labels) = post.dim_labels.get(d) {
            axis.labels = labels.clone();
        }
    }

    array.info = note::parse(&post.note, opts.note_mode);

    let (creation_date, mod_date, full_scale) = match &headers.wave {
        WaveHeader::V5(h) => (
            h.creation_date,
            h.mod_date,
            (h.fs_valid != 0).then_some((h.top_full_scale, h.bot_full_scale)),
        ),
        WaveHeader::V2(h) => (
            h.creation_date,
            h.mod_date,
            (h.fs_valid != 0).then_some((h.top_full_scale, h.bot_full_scale)),
        ),
    };
    array.source = Some(SourceInfo {
        version: headers.version(),
        byte_order: headers.byte_order,
        note: post.note.replace('\r', "\n"),
        formula: post.formula,
        creation_date,
        mod_date,
        full_scale,
        path: None,
    });
}

fn section_len(size: i32, what: &'static str) -> Result<usize> {
    usize::try_from(size).map_err(|_| IgorError::format(format!("negative {what} size {size}")))
}

fn read_sized<R: Read + ?Sized>(r: &mut R, size: i32, what: &'static str) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; section_len(size, what)?];
    read_fully(r, &mut buf, what)?;
    Ok(buf)
}

fn read_text<R: Read + ?Sized>(r: &mut R, size: i32, what: &'static str) -> Result<String> {
    let raw = read_sized(r, size, what)?;
    let text = String::from_utf8_lossy(&raw);
    Ok(text.trim_matches(|c: char| c.is_whitespace() || c == '\0').to_string())
}

fn skip<R: Read + ?Sized>(r: &mut R, n: usize, what: &'static str) -> Result<()> {
    let mut pad = vec![0u8; n];
    read_fully(r, &mut pad, what)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endian::ByteOrder;
    use crate::error::ErrorKind;
    use crate::format::to_fixed;
    use crate::header::{BinHeader2, WaveHeader2};

    /// A version 2 wave of `values` (int16) with `note`.
    fn v2_bytes(values: &[i16], note: &str, order: ByteOrder) -> Vec<u8> {
        let mut data = Vec::new();
        for v in values {
            let mut b = [0u8; 2];
            order.write_i16(&mut b, 0, *v);
            data.extend_from_slice(&b);
        }
        // the wData field overlaps data and padding alike
        let wfm_size = 126 + data.len() as i32;
        data.extend_from_slice(&[0u8; 16]);
        let mut wave = WaveHeader2 {
            type_code: 0x10,
            npnts: values.len() as i32,
            bname: to_fixed("short"),
            hs_a: 0.25,
            hs_b: 10.0,
            x_units: to_fixed("s"),
            ..WaveHeader2::default()
        };
        wave.w_data.copy_from_slice(&data[..16]);
        let bin = BinHeader2 {
            wfm_size,
            note_size: note.len() as i32,
            ..BinHeader2::default()
        };
        let mut h = WaveHeaders::new(BinHeader::V2(bin), WaveHeader::V2(wave), order).unwrap();
        h.seal();
        let mut out = h.encode();
        out.extend_from_slice(&data[16..]);
        out.extend_from_slice(note.as_bytes());
        out
    }

    #[test]
    fn data_shorter_than_tail_keeps_trailer_aligned() {
        // 3 points = 6 bytes, the remaining 10 tail bytes are padding
        let bytes = v2_bytes(&[1, -2, 3], "k = 7", ByteOrder::Big);
        let a = read_from(&mut bytes.as_slice(), &ReadOptions::default()).unwrap();
        assert_eq!(a.values::<i16>().unwrap(), vec![1, -2, 3]);
        assert_eq!(a.info.get("", "k"), Some(&note::NoteValue::from(7)));
        assert_eq!(a.source.as_ref().unwrap().note, "k = 7");
    }

    #[test]
    fn long_v2_wave_reads_past_the_tail() {
        let values: Vec<i16> = (0..40).collect();
        let bytes = v2_bytes(&values, "", ByteOrder::Little);
        let a = read_from(&mut bytes.as_slice(), &ReadOptions::default()).unwrap();
        assert_eq!(a.values::<i16>().unwrap(), values);
        assert_eq!(a.name, "short");
        assert_eq!(a.axes[0].units, "s");
        assert_eq!(a.axis_value(0, 4), Some(11.0));
    }

    #[test]
    fn missing_padding_is_a_short_read() {
        let mut bytes = v2_bytes(&(0..20).collect::<Vec<i16>>(), "", ByteOrder::Little);
        bytes.truncate(bytes.len() - 8);
        let err = read_from(&mut bytes.as_slice(), &ReadOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn declared_shape_rejects_inconsistent_counts() {
        let wave = WaveHeader::V5(crate::header::WaveHeader5 {
            npnts: 5,
            n_dim: [2, 2, 0, 0],
            ..Default::default()
        });
        assert!(declared_shape(&wave).is_err());
        let wave = WaveHeader::V5(crate::header::WaveHeader5 {
            npnts: 3,
            ..Default::default()
        });
        assert_eq!(declared_shape(&wave).unwrap(), vec![3]);
    }
}
