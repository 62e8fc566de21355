//! Container and wave headers for every supported file version.
//!
//! | version | container header | wave header   | checksum span        |
//! |---------|------------------|---------------|----------------------|
//! | 1       | `BinHeader1` 8   | `WaveHeader2` | both headers         |
//! | 2       | `BinHeader2` 16  | `WaveHeader2` | both headers         |
//! | 3       | `BinHeader3` 20  | `WaveHeader2` | both headers         |
//! | 5       | `BinHeader5` 64  | `WaveHeader5` | both headers − wData |
//!
//! The wave header is stored directly after the container header and ends
//! with a `wData` field that already holds the first bytes of the data.
//! Fields that Igor uses in memory only are written as zero and skipped on
//! read.

use std::io::Read;

use crate::checksum::{checksum, seal};
use crate::endian::{detect_version, read_fully, ByteOrder, FieldReader, FieldWriter};
use crate::error::{IgorError, Result};
use crate::format::{
    fixed_str, FormatVersion, Layout, BIN_HEADER1_SIZE, BIN_HEADER2_SIZE, BIN_HEADER3_SIZE,
    BIN_HEADER5_SIZE, MAX_DIMS, TAIL_SIZE_V2, TAIL_SIZE_V5, WAVE_HEADER2_SIZE, WAVE_HEADER5_SIZE,
};

// ── Container headers ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinHeader1 {
    /// Wave header plus data plus 16 bytes of padding.
    pub wfm_size: i32,
    pub checksum: i16,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinHeader2 {
    pub wfm_size: i32,
    pub note_size: i32,
    pub pict_size: i32,
    pub checksum: i16,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinHeader3 {
    pub wfm_size: i32,
    pub note_size: i32,
    /// Size of the dependency formula, if any.
    pub formula_size: i32,
    pub pict_size: i32,
    pub checksum: i16,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinHeader5 {
    pub checksum: i16,
    /// Wave header (without `wData`) plus data.
    pub wfm_size: i32,
    pub formula_size: i32,
    pub note_size: i32,
    pub data_e_units_size: i32,
    pub dim_e_units_size: [i32; MAX_DIMS],
    pub dim_labels_size: [i32; MAX_DIMS],
    /// Text waves only.
    pub s_indices_size: i32,
    pub options_size1: i32,
    pub options_size2: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BinHeader {
    V1(BinHeader1),
    V2(BinHeader2),
    V3(BinHeader3),
    V5(BinHeader5),
}

impl BinHeader {
    pub fn version(&self) -> FormatVersion {
        match self {
            BinHeader::V1(_) => FormatVersion::V1,
            BinHeader::V2(_) => FormatVersion::V2,
            BinHeader::V3(_) => FormatVersion::V3,
            BinHeader::V5(_) => FormatVersion::V5,
        }
    }

    pub fn wfm_size(&self) -> i32 {
        match self {
            BinHeader::V1(h) => h.wfm_size,
            BinHeader::V2(h) => h.wfm_size,
            BinHeader::V3(h) => h.wfm_size,
            BinHeader::V5(h) => h.wfm_size,
        }
    }

    pub fn note_size(&self) -> i32 {
        match self {
            BinHeader::V1(_) => 0,
            BinHeader::V2(h) => h.note_size,
            BinHeader::V3(h) => h.note_size,
            BinHeader::V5(h) => h.note_size,
        }
    }

    pub fn formula_size(&self) -> i32 {
        match self {
            BinHeader::V1(_) | BinHeader::V2(_) => 0,
            BinHeader::V3(h) => h.formula_size,
            BinHeader::V5(h) => h.formula_size,
        }
    }

    pub fn checksum(&self) -> i16 {
        match self {
            BinHeader::V1(h) => h.checksum,
            BinHeader::V2(h) => h.checksum,
            BinHeader::V3(h) => h.checksum,
            BinHeader::V5(h) => h.checksum,
        }
    }

    pub fn set_checksum(&mut self, value: i16) {
        match self {
            BinHeader::V1(h) => h.checksum = value,
            BinHeader::V2(h) => h.checksum = value,
            BinHeader::V3(h) => h.checksum = value,
            BinHeader::V5(h) => h.checksum = value,
        }
    }

    /// Decode from a buffer that starts with the container header.
    pub fn decode(version: FormatVersion, buf: &[u8], order: ByteOrder) -> Self {
        let mut r = FieldReader::new(buf, order);
        r.skip(2); // version, already known
        match version {
            FormatVersion::V1 => BinHeader::V1(BinHeader1 {
                wfm_size: r.i32(),
                checksum: r.i16(),
            }),
            FormatVersion::V2 => BinHeader::V2(BinHeader2 {
                wfm_size: r.i32(),
                note_size: r.i32(),
                pict_size: r.i32(),
                checksum: r.i16(),
            }),
            FormatVersion::V3 => BinHeader::V3(BinHeader3 {
                wfm_size: r.i32(),
                note_size: r.i32(),
                formula_size: r.i32(),
                pict_size: r.i32(),
                checksum: r.i16(),
            }),
            FormatVersion::V5 => {
                let checksum = r.i16();
                let wfm_size = r.i32();
                let formula_size = r.i32();
                let note_size = r.i32();
                let data_e_units_size = r.i32();
                let mut dim_e_units_size = [0i32; MAX_DIMS];
                for v in dim_e_units_size.iter_mut() {
                    *v = r.i32();
                }
                let mut dim_labels_size = [0i32; MAX_DIMS];
                for v in dim_labels_size.iter_mut() {
                    *v = r.i32();
                }
                BinHeader::V5(BinHeader5 {
                    checksum,
                    wfm_size,
                    formula_size,
                    note_size,
                    data_e_units_size,
                    dim_e_units_size,
                    dim_labels_size,
                    s_indices_size: r.i32(),
                    options_size1: r.i32(),
                    options_size2: r.i32(),
                })
            }
        }
    }

    pub fn encode(&self, order: ByteOrder) -> Vec<u8> {
        let version = self.version();
        let mut w = FieldWriter::with_capacity(version.layout().bin_size, order);
        w.i16(version.number());
        match self {
            BinHeader::V1(h) => {
                w.i32(h.wfm_size);
                w.i16(h.checksum);
            }
            BinHeader::V2(h) => {
                w.i32(h.wfm_size);
                w.i32(h.note_size);
                w.i32(h.pict_size);
                w.i16(h.checksum);
            }
            BinHeader::V3(h) => {
                w.i32(h.wfm_size);
                w.i32(h.note_size);
                w.i32(h.formula_size);
                w.i32(h.pict_size);
                w.i16(h.checksum);
            }
            BinHeader::V5(h) => {
                w.i16(h.checksum);
                w.i32(h.wfm_size);
                w.i32(h.formula_size);
                w.i32(h.note_size);
                w.i32(h.data_e_units_size);
                for v in h.dim_e_units_size {
                    w.i32(v);
                }
                for v in h.dim_labels_size {
                    w.i32(v);
                }
                w.i32(h.s_indices_size);
                w.i32(h.options_size1);
                w.i32(h.options_size2);
            }
        }
        debug_assert_eq!(
            w.len(),
            match version {
                FormatVersion::V1 => BIN_HEADER1_SIZE,
                FormatVersion::V2 => BIN_HEADER2_SIZE,
                FormatVersion::V3 => BIN_HEADER3_SIZE,
                FormatVersion::V5 => BIN_HEADER5_SIZE,
            }
        );
        w.into_inner()
    }
}

// ── Wave headers ───────────────────────────────────────────────────────────

/// Wave header used by versions 1, 2 and 3.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveHeader2 {
    pub type_code: i16,
    /// Name plus trailing null.
    pub bname: [u8; 20],
    pub wh_version: i16,
    pub data_units: [u8; 4],
    pub x_units: [u8; 4],
    pub npnts: i32,
    /// X value for point p is `hs_a * p + hs_b`.
    pub hs_a: f64,
    pub hs_b: f64,
    pub fs_valid: i16,
    pub top_full_scale: f64,
    pub bot_full_scale: f64,
    pub creation_date: u32,
    pub mod_date: u32,
    pub w_data: [u8; TAIL_SIZE_V2],
}

impl Default for WaveHeader2 {
    fn default() -> Self {
        Self {
            type_code: 0,
            bname: [0; 20],
            wh_version: 0,
            data_units: [0; 4],
            x_units: [0; 4],
            npnts: 0,
            hs_a: 1.0,
            hs_b: 0.0,
            fs_valid: 0,
            top_full_scale: 0.0,
            bot_full_scale: 0.0,
            creation_date: 0,
            mod_date: 0,
            w_data: [0; TAIL_SIZE_V2],
        }
    }
}

/// Wave header used by version 5.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveHeader5 {
    pub creation_date: u32,
    pub mod_date: u32,
    /// Total number of points (product of dimensions up to the first zero).
    pub npnts: i32,
    pub type_code: i16,
    pub d_lock: i16,
    pub wh_version: i16,
    pub bname: [u8; 32],
    /// Items per dimension; 0 ends the dimension list.
    pub n_dim: [i32; MAX_DIMS],
    /// Index value for element e of dimension d is `sf_a[d] * e + sf_b[d]`.
    pub sf_a: [f64; MAX_DIMS],
    pub sf_b: [f64; MAX_DIMS],
    pub data_units: [u8; 4],
    pub dim_units: [[u8; 4]; MAX_DIMS],
    pub fs_valid: u16,
    pub top_full_scale: f64,
    pub bot_full_scale: f64,
    pub w_data: [u8; TAIL_SIZE_V5],
}

impl Default for WaveHeader5 {
    fn default() -> Self {
        Self {
            creation_date: 0,
            mod_date: 0,
            npnts: 0,
            type_code: 0,
            d_lock: 0,
            wh_version: 1,
            bname: [0; 32],
            n_dim: [0; MAX_DIMS],
            sf_a: [1.0; MAX_DIMS],
            sf_b: [0.0; MAX_DIMS],
            data_units: [0; 4],
            dim_units: [[0; 4]; MAX_DIMS],
            fs_valid: 0,
            top_full_scale: 0.0,
            bot_full_scale: 0.0,
            w_data: [0; TAIL_SIZE_V5],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WaveHeader {
    V2(WaveHeader2),
    V5(WaveHeader5),
}

impl WaveHeader {
    pub fn type_code(&self) -> i16 {
        match self {
            WaveHeader::V2(h) => h.type_code,
            WaveHeader::V5(h) => h.type_code,
        }
    }

    pub fn npnts(&self) -> i32 {
        match self {
            WaveHeader::V2(h) => h.npnts,
            WaveHeader::V5(h) => h.npnts,
        }
    }

    pub fn name(&self) -> String {
        match self {
            WaveHeader::V2(h) => fixed_str(&h.bname),
            WaveHeader::V5(h) => fixed_str(&h.bname),
        }
    }

    /// The `wData` bytes, i.e. the first bytes of the data block.
    pub fn tail(&self) -> &[u8] {
        match self {
            WaveHeader::V2(h) => &h.w_data,
            WaveHeader::V5(h) => &h.w_data,
        }
    }

    pub fn decode(version: FormatVersion, buf: &[u8], order: ByteOrder) -> Self {
        let mut r = FieldReader::new(buf, order);
        match version {
            FormatVersion::V5 => WaveHeader::V5(decode_wave5(&mut r)),
            _ => WaveHeader::V2(decode_wave2(&mut r)),
        }
    }

    pub fn encode(&self, order: ByteOrder) -> Vec<u8> {
        match self {
            WaveHeader::V2(h) => {
                let mut w = FieldWriter::with_capacity(WAVE_HEADER2_SIZE, order);
                encode_wave2(h, &mut w);
                debug_assert_eq!(w.len(), WAVE_HEADER2_SIZE);
                w.into_inner()
            }
            WaveHeader::V5(h) => {
                let mut w = FieldWriter::with_capacity(WAVE_HEADER5_SIZE, order);
                encode_wave5(h, &mut w);
                debug_assert_eq!(w.len(), WAVE_HEADER5_SIZE);
                w.into_inner()
            }
        }
    }
}

fn decode_wave2(r: &mut FieldReader<'_>) -> WaveHeader2 {
    let type_code = r.i16();
    r.skip(4); // next
    let bname = r.bytes::<20>();
    let wh_version = r.i16();
    r.skip(2 + 4); // srcFldr, fileName
    let data_units = r.bytes::<4>();
    let x_units = r.bytes::<4>();
    let npnts = r.i32();
    r.skip(2); // aModified
    let hs_a = r.f64();
    let hs_b = r.f64();
    r.skip(2 + 2); // wModified, swModified
    let fs_valid = r.i16();
    let top_full_scale = r.f64();
    let bot_full_scale = r.f64();
    r.skip(1 + 1 + 4 + 4); // useBits, kindBits, formula, depID
    let creation_date = r.u32();
    r.skip(2); // wUnused
    let mod_date = r.u32();
    r.skip(4); // waveNoteH
    let w_data = r.bytes::<TAIL_SIZE_V2>();
    WaveHeader2 {
        type_code,
        bname,
        wh_version,
        data_units,
        x_units,
        npnts,
        hs_a,
        hs_b,
        fs_valid,
        top_full_scale,
        bot_full_scale,
        creation_date,
        mod_date,
        w_data,
    }
}

fn encode_wave2(h: &WaveHeader2, w: &mut FieldWriter) {
    w.i16(h.type_code);
    w.zeros(4);
    w.bytes(&h.bname);
    w.i16(h.wh_version);
    w.zeros(2 + 4);
    w.bytes(&h.data_units);
    w.bytes(&h.x_units);
    w.i32(h.npnts);
    w.zeros(2);
    w.f64(h.hs_a);
    w.f64(h.hs_b);
    w.zeros(2 + 2);
    w.i16(h.fs_valid);
    w.f64(h.top_full_scale);
    w.f64(h.bot_full_scale);
    w.zeros(1 + 1 + 4 + 4);
    w.u32(h.creation_date);
    w.zeros(2);
    w.u32(h.mod_date);
    w.zeros(4);
    w.bytes(&h.w_data);
}

fn decode_wave5(r: &mut FieldReader<'_>) -> WaveHeader5 {
    r.skip(4); // next
    let creation_date = r.u32();
    let mod_date = r.u32();
    let npnts = r.i32();
    let type_code = r.i16();
    let d_lock = r.i16();
    r.skip(6); // whpad1
    let wh_version = r.i16();
    let bname = r.bytes::<32>();
    r.skip(4 + 4); // whpad2, dFolder
    let mut n_dim = [0i32; MAX_DIMS];
    for v in n_dim.iter_mut() {
        *v = r.i32();
    }
    let mut sf_a = [0f64; MAX_DIMS];
    for v in sf_a.iter_mut() {
        *v = r.f64();
    }
    let mut sf_b = [0f64; MAX_DIMS];
    for v in sf_b.iter_mut() {
        *v = r.f64();
    }
    let data_units = r.bytes::<4>();
    let mut dim_units = [[0u8; 4]; MAX_DIMS];
    for v in dim_units.iter_mut() {
        *v = r.bytes::<4>();
    }
    let fs_valid = r.u16();
    r.skip(2); // whpad3
    let top_full_scale = r.f64();
    let bot_full_scale = r.f64();
    // dataEUnits, dimEUnits, dimLabels, waveNoteH, whUnused and the private
    // tail of the structure
    r.skip(4 + 16 + 16 + 4 + 64);
    r.skip(2 + 2 + 2 + 1 + 1 + 4 + 4 + 2 + 2 + 4 + 4);
    let w_data = r.bytes::<TAIL_SIZE_V5>();
    WaveHeader5 {
        creation_date,
        mod_date,
        npnts,
        type_code,
        d_lock,
        wh_version,
        bname,
        n_dim,
        sf_a,
        sf_b,
        data_units,
        dim_units,
        fs_valid,
        top_full_scale,
        bot_full_scale,
        w_data,
    }
}

fn encode_wave5(h: &WaveHeader5, w: &mut FieldWriter) {
    w.zeros(4);
    w.u32(h.creation_date);
    w.u32(h.mod_date);
    w.i32(h.npnts);
    w.i16(h.type_code);
    w.i16(h.d_lock);
    w.zeros(6);
    w.i16(h.wh_version);
    w.bytes(&h.bname);
    w.zeros(4 + 4);
    for v in h.n_dim {
        w.i32(v);
    }
    for v in h.sf_a {
        w.f64(v);
    }
    for v in h.sf_b {
        w.f64(v);
    }
    w.bytes(&h.data_units);
    for u in &h.dim_units {
        w.bytes(u);
    }
    w.u16(h.fs_valid);
    w.zeros(2);
    w.f64(h.top_full_scale);
    w.f64(h.bot_full_scale);
    w.zeros(4 + 16 + 16 + 4 + 64);
    w.zeros(2 + 2 + 2 + 1 + 1 + 4 + 4 + 2 + 2 + 4 + 4);
    w.bytes(&h.w_data);
}

// ── Header pair ────────────────────────────────────────────────────────────

/// Both headers of one wave, plus what the rest of the decoder needs to know
/// about the data block that follows them.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveHeaders {
    pub byte_order: ByteOrder,
    pub bin: BinHeader,
    pub wave: WaveHeader,
}

impl WaveHeaders {
    /// Pair two headers. Fails if they belong to different versions.
    pub fn new(bin: BinHeader, wave: WaveHeader, byte_order: ByteOrder) -> Result<Self> {
        let matches = matches!(
            (&bin, &wave),
            (BinHeader::V5(_), WaveHeader::V5(_))
                | (BinHeader::V1(_) | BinHeader::V2(_) | BinHeader::V3(_), WaveHeader::V2(_))
        );
        if !matches {
            return Err(IgorError::format(format!(
                "version {} container header cannot carry this wave header",
                bin.version().number()
            )));
        }
        Ok(Self {
            byte_order,
            bin,
            wave,
        })
    }

    pub fn version(&self) -> FormatVersion {
        self.bin.version()
    }

    pub fn layout(&self) -> Layout {
        self.version().layout()
    }

    pub fn name(&self) -> String {
        self.wave.name()
    }

    /// Size in bytes of the wave data, derived from `wfmSize`.
    pub fn wave_data_size(&self) -> Result<usize> {
        let wfm = self.bin.wfm_size() as i64;
        let data = wfm - self.layout().wfm_overhead() as i64;
        usize::try_from(data).map_err(|_| {
            IgorError::format(format!(
                "wfmSize {} is smaller than the version {} wave header",
                wfm,
                self.version().number()
            ))
        })
    }

    /// Serialize both headers, `wData` included, with the stored checksum.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.bin.encode(self.byte_order);
        out.extend(self.wave.encode(self.byte_order));
        out
    }

    /// Recompute and store the checksum so that the span sums to zero.
    pub fn seal(&mut self) {
        self.bin.set_checksum(0);
        let bytes = self.encode();
        let value = seal(&bytes, self.byte_order, self.layout().checksum_span);
        self.bin.set_checksum(value);
    }

    /// Decode and verify a header pair from the start of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < 2 {
            return Err(IgorError::ShortRead {
                what: "version field",
                expected: 2,
                got: buf.len(),
            });
        }
        let (version, order) = detect_version([buf[0], buf[1]])?;
        let layout = version.layout();
        if buf.len() < layout.header_size() {
            return Err(IgorError::ShortRead {
                what: "wave headers",
                expected: layout.header_size(),
                got: buf.len(),
            });
        }
        decode_verified(&buf[..layout.header_size()], version, order)
    }
}

fn decode_verified(buf: &[u8], version: FormatVersion, order: ByteOrder) -> Result<WaveHeaders> {
    let layout = version.layout();
    let computed = checksum(buf, order, 0, layout.checksum_span);
    if computed != 0 {
        return Err(IgorError::Checksum {
            expected: 0,
            computed,
        });
    }
    let bin = BinHeader::decode(version, &buf[..layout.bin_size], order);
    let wave = WaveHeader::decode(version, &buf[layout.bin_size..], order);
    let headers = WaveHeaders::new(bin, wave, order)?;
    // reject impossible sizes before anything is allocated from them
    headers.wave_data_size()?;
    Ok(headers)
}

/// Read and verify the header pair at the current stream position.
///
/// On success the stream is positioned right after the wave header, i.e.
/// `tail_size` bytes into the data block.
pub fn read_headers<R: Read + ?Sized>(r: &mut R) -> Result<WaveHeaders> {
    let mut version_field = [0u8; 2];
    read_fully(r, &mut version_field, "version field")?;
    let (version, order) = detect_version(version_field)?;
    let layout = version.layout();

    let mut buf = vec![0u8; layout.header_size()];
    buf[..2].copy_from_slice(&version_field);
    read_fully(r, &mut buf[2..], "wave headers")?;

    let headers = decode_verified(&buf, version, order)?;
    tracing::debug!(
        version = version.number(),
        byte_order = order.name(),
        name = %headers.name(),
        type_code = headers.wave.type_code(),
        npnts = headers.wave.npnts(),
        "decoded wave headers"
    );
    Ok(headers)
}
