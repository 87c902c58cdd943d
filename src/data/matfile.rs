//! MAT-file (Level 5) container
//!
//! Minimal writer and reader for uncompressed, little-endian MAT v5 files,
//! enough to exchange dense numeric, logical and char arrays with MATLAB and
//! `scipy.io.loadmat`. Layout per variable:
//!
//! ```text
//! miMATRIX tag
//!   array flags (miUINT32)   class in the low byte, complex / logical bits
//!   dimensions  (miINT32)
//!   name        (miINT8)
//!   real part   (typed)
//!   imag part   (typed, complex only)
//! ```
//!
//! Every element is padded to 8 bytes. Data is stored column-major.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use ndarray::{Array1, Array2, ArrayD, IxDyn, ShapeBuilder};
use num_complex::Complex32;

use crate::core::{SurfaceBundle, SurfaceError, SurfaceResult};

const HEADER_LEN: usize = 128;
const HEADER_TEXT_LEN: usize = 116;
const VERSION: u16 = 0x0100;

// Storage types
const MI_INT8: u32 = 1;
const MI_UINT8: u32 = 2;
const MI_INT16: u32 = 3;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_SINGLE: u32 = 7;
const MI_DOUBLE: u32 = 9;
const MI_INT64: u32 = 12;
const MI_UINT64: u32 = 13;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;
const MI_UTF8: u32 = 16;

// Array classes
const MX_CELL: u32 = 1;
const MX_STRUCT: u32 = 2;
const MX_OBJECT: u32 = 3;
const MX_CHAR: u32 = 4;
const MX_SPARSE: u32 = 5;
const MX_DOUBLE: u32 = 6;
const MX_SINGLE: u32 = 7;
const MX_UINT8: u32 = 9;

const FLAG_COMPLEX: u32 = 0x0800;
const FLAG_LOGICAL: u32 = 0x0200;

/// Array payload, column-major
#[derive(Debug, Clone, PartialEq)]
pub enum MatData {
    F64(Vec<f64>),
    F32(Vec<f32>),
    ComplexF32 { re: Vec<f32>, im: Vec<f32> },
    Logical(Vec<u8>),
    Char(String),
}

impl MatData {
    pub fn len(&self) -> usize {
        match self {
            MatData::F64(v) => v.len(),
            MatData::F32(v) => v.len(),
            MatData::ComplexF32 { re, .. } => re.len(),
            MatData::Logical(v) => v.len(),
            MatData::Char(s) => s.encode_utf16().count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn class_flags(&self) -> u32 {
        match self {
            MatData::F64(_) => MX_DOUBLE,
            MatData::F32(_) => MX_SINGLE,
            MatData::ComplexF32 { .. } => MX_SINGLE | FLAG_COMPLEX,
            MatData::Logical(_) => MX_UINT8 | FLAG_LOGICAL,
            MatData::Char(_) => MX_CHAR,
        }
    }

    /// Storage type, real bytes, imaginary bytes
    fn encode(&self) -> (u32, Vec<u8>, Option<Vec<u8>>) {
        match self {
            MatData::F64(v) => (MI_DOUBLE, v.iter().flat_map(|x| x.to_le_bytes()).collect(), None),
            MatData::F32(v) => (MI_SINGLE, v.iter().flat_map(|x| x.to_le_bytes()).collect(), None),
            MatData::ComplexF32 { re, im } => (
                MI_SINGLE,
                re.iter().flat_map(|x| x.to_le_bytes()).collect(),
                Some(im.iter().flat_map(|x| x.to_le_bytes()).collect()),
            ),
            MatData::Logical(v) => (MI_UINT8, v.clone(), None),
            MatData::Char(s) => (MI_UINT16, s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect(), None),
        }
    }

    /// Real values widened to f64, for numeric and logical payloads
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            MatData::F64(v) => Some(v.clone()),
            MatData::F32(v) => Some(v.iter().map(|&x| x as f64).collect()),
            MatData::Logical(v) => Some(v.iter().map(|&x| x as f64).collect()),
            _ => None,
        }
    }
}

/// A named array
#[derive(Debug, Clone, PartialEq)]
pub struct MatVariable {
    pub name: String,
    pub dims: Vec<usize>,
    pub data: MatData,
}

impl MatVariable {
    pub fn new(name: impl Into<String>, dims: Vec<usize>, data: MatData) -> Self {
        Self {
            name: name.into(),
            dims,
            data,
        }
    }

    /// 1-D vectors are stored as 1 x n rows
    pub fn row_vector(name: impl Into<String>, values: &Array1<f64>) -> Self {
        Self::new(name, vec![1, values.len()], MatData::F64(values.to_vec()))
    }

    pub fn string(name: impl Into<String>, value: &str) -> Self {
        let len = value.encode_utf16().count();
        Self::new(name, vec![1, len], MatData::Char(value.to_string()))
    }

    fn element_count(&self) -> usize {
        self.dims.iter().product()
    }
}

fn padding(len: usize) -> usize {
    (8 - len % 8) % 8
}

fn push_element(buf: &mut Vec<u8>, data_type: u32, payload: &[u8]) {
    buf.extend_from_slice(&data_type.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);
    buf.extend(std::iter::repeat(0u8).take(padding(payload.len())));
}

fn encode_variable(var: &MatVariable) -> SurfaceResult<Vec<u8>> {
    if var.element_count() != var.data.len() {
        return Err(SurfaceError::serialization(format!(
            "variable '{}' has dims {:?} but {} elements",
            var.name,
            var.dims,
            var.data.len()
        )));
    }

    // MAT arrays have at least two dimensions
    let mut dims = var.dims.clone();
    while dims.len() < 2 {
        dims.push(1);
    }

    let mut body = Vec::new();

    let mut flags = Vec::with_capacity(8);
    flags.extend_from_slice(&var.data.class_flags().to_le_bytes());
    flags.extend_from_slice(&0u32.to_le_bytes());
    push_element(&mut body, MI_UINT32, &flags);

    let mut dim_bytes = Vec::with_capacity(dims.len() * 4);
    for d in &dims {
        let d = i32::try_from(*d)
            .map_err(|_| SurfaceError::serialization(format!("dimension {} too large", d)))?;
        dim_bytes.extend_from_slice(&d.to_le_bytes());
    }
    push_element(&mut body, MI_INT32, &dim_bytes);

    push_element(&mut body, MI_INT8, var.name.as_bytes());

    let (data_type, re, im) = var.data.encode();
    push_element(&mut body, data_type, &re);
    if let Some(im) = im {
        push_element(&mut body, data_type, &im);
    }

    let mut out = Vec::with_capacity(body.len() + 8);
    push_element(&mut out, MI_MATRIX, &body);
    Ok(out)
}

/// Streams variables into a MAT v5 file
pub struct MatWriter<W: Write> {
    inner: W,
}

impl<W: Write> MatWriter<W> {
    /// Write the 128-byte file header
    pub fn new(mut inner: W) -> SurfaceResult<Self> {
        let text = format!(
            "MATLAB 5.0 MAT-file, Platform: psi-surface, Created on: {}",
            Utc::now().format("%a %b %e %H:%M:%S %Y")
        );
        let mut header = vec![b' '; HEADER_LEN];
        let n = text.len().min(HEADER_TEXT_LEN);
        header[..n].copy_from_slice(&text.as_bytes()[..n]);
        // Subsystem data offset: unused
        header[HEADER_TEXT_LEN..HEADER_TEXT_LEN + 8].fill(0);
        header[124..126].copy_from_slice(&VERSION.to_le_bytes());
        header[126..128].copy_from_slice(b"IM");

        inner.write_all(&header)?;
        Ok(Self { inner })
    }

    pub fn write_variable(&mut self, var: &MatVariable) -> SurfaceResult<()> {
        let bytes = encode_variable(var)?;
        self.inner.write_all(&bytes)?;
        Ok(())
    }

    pub fn finish(mut self) -> SurfaceResult<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> SurfaceResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(SurfaceError::serialization("truncated MAT element"));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self) -> SurfaceResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Next `(type, payload)`; handles the packed small-element form
    fn element(&mut self) -> SurfaceResult<Option<(u32, &'a [u8])>> {
        if self.remaining() == 0 {
            return Ok(None);
        }

        let word = self.u32()?;
        let small_len = (word >> 16) as usize;
        if small_len != 0 {
            if small_len > 4 {
                return Err(SurfaceError::serialization("invalid small MAT element"));
            }
            let data = self.take(4)?;
            return Ok(Some((word & 0xffff, &data[..small_len])));
        }

        let len = self.u32()? as usize;
        let data = self.take(len)?;
        let pad = padding(len).min(self.remaining());
        self.pos += pad;
        Ok(Some((word, data)))
    }

    fn expect_element(&mut self, what: &str) -> SurfaceResult<(u32, &'a [u8])> {
        self.element()?
            .ok_or_else(|| SurfaceError::serialization(format!("matrix is missing its {}", what)))
    }
}

fn decode_numeric(data_type: u32, bytes: &[u8]) -> SurfaceResult<Vec<f64>> {
    fn chunks<const N: usize>(bytes: &[u8]) -> impl Iterator<Item = [u8; N]> + '_ {
        bytes.chunks_exact(N).map(|c| {
            let mut arr = [0u8; N];
            arr.copy_from_slice(c);
            arr
        })
    }

    let values: Vec<f64> = match data_type {
        MI_INT8 => bytes.iter().map(|&b| b as i8 as f64).collect(),
        MI_UINT8 | MI_UTF8 => bytes.iter().map(|&b| b as f64).collect(),
        MI_INT16 => chunks::<2>(bytes).map(|c| i16::from_le_bytes(c) as f64).collect(),
        MI_UINT16 => chunks::<2>(bytes).map(|c| u16::from_le_bytes(c) as f64).collect(),
        MI_INT32 => chunks::<4>(bytes).map(|c| i32::from_le_bytes(c) as f64).collect(),
        MI_UINT32 => chunks::<4>(bytes).map(|c| u32::from_le_bytes(c) as f64).collect(),
        MI_SINGLE => chunks::<4>(bytes).map(|c| f32::from_le_bytes(c) as f64).collect(),
        MI_DOUBLE => chunks::<8>(bytes).map(f64::from_le_bytes).collect(),
        MI_INT64 => chunks::<8>(bytes).map(|c| i64::from_le_bytes(c) as f64).collect(),
        MI_UINT64 => chunks::<8>(bytes).map(|c| u64::from_le_bytes(c) as f64).collect(),
        other => {
            return Err(SurfaceError::serialization(format!(
                "unsupported MAT storage type {}",
                other
            )))
        }
    };
    Ok(values)
}

fn decode_matrix(body: &[u8]) -> SurfaceResult<MatVariable> {
    let mut cur = ByteCursor::new(body);

    let (_, flag_bytes) = cur.expect_element("array flags")?;
    if flag_bytes.len() < 4 {
        return Err(SurfaceError::serialization("short array flags"));
    }
    let flags = u32::from_le_bytes([flag_bytes[0], flag_bytes[1], flag_bytes[2], flag_bytes[3]]);
    let class = flags & 0xff;
    let complex = flags & FLAG_COMPLEX != 0;
    let logical = flags & FLAG_LOGICAL != 0;

    let (_, dim_bytes) = cur.expect_element("dimensions")?;
    let dims = dim_bytes
        .chunks_exact(4)
        .map(|c| {
            let d = i32::from_le_bytes([c[0], c[1], c[2], c[3]]);
            usize::try_from(d).map_err(|_| SurfaceError::serialization("negative dimension"))
        })
        .collect::<SurfaceResult<Vec<usize>>>()?;

    let (_, name_bytes) = cur.expect_element("name")?;
    let name = String::from_utf8(name_bytes.to_vec())
        .map_err(|_| SurfaceError::serialization("variable name is not valid UTF-8"))?;

    if matches!(class, MX_CELL | MX_STRUCT | MX_OBJECT | MX_SPARSE) {
        return Err(SurfaceError::serialization(format!(
            "variable '{}' has unsupported array class {}",
            name, class
        )));
    }

    let (re_type, re_bytes) = cur.expect_element("real part")?;
    let data = if class == MX_CHAR {
        let text = if re_type == MI_UTF8 {
            String::from_utf8(re_bytes.to_vec())
                .map_err(|_| SurfaceError::serialization(format!("'{}' is not valid UTF-8", name)))?
        } else {
            let units: Vec<u16> = decode_numeric(re_type, re_bytes)?
                .into_iter()
                .map(|v| v as u16)
                .collect();
            String::from_utf16(&units)
                .map_err(|_| SurfaceError::serialization(format!("'{}' is not valid UTF-16", name)))?
        };
        MatData::Char(text)
    } else if logical {
        MatData::Logical(
            decode_numeric(re_type, re_bytes)?
                .into_iter()
                .map(|v| u8::from(v != 0.0))
                .collect(),
        )
    } else if complex {
        let (im_type, im_bytes) = cur.expect_element("imaginary part")?;
        let re = decode_numeric(re_type, re_bytes)?.into_iter().map(|v| v as f32).collect();
        let im = decode_numeric(im_type, im_bytes)?.into_iter().map(|v| v as f32).collect();
        MatData::ComplexF32 { re, im }
    } else if class == MX_SINGLE {
        MatData::F32(decode_numeric(re_type, re_bytes)?.into_iter().map(|v| v as f32).collect())
    } else {
        MatData::F64(decode_numeric(re_type, re_bytes)?)
    };

    let var = MatVariable { name, dims, data };
    let expected = var.element_count();
    let consistent = match &var.data {
        MatData::ComplexF32 { re, im } => re.len() == expected && im.len() == expected,
        data => data.len() == expected,
    };
    if !consistent {
        return Err(SurfaceError::serialization(format!(
            "variable '{}' has dims {:?} but {} elements",
            var.name,
            var.dims,
            var.data.len()
        )));
    }
    Ok(var)
}

/// Read every variable of a MAT v5 file
pub fn read_mat<R: Read>(mut reader: R) -> SurfaceResult<Vec<MatVariable>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;

    if buf.len() < HEADER_LEN {
        return Err(SurfaceError::serialization("file too short for a MAT header"));
    }
    if &buf[126..128] != b"IM" {
        return Err(SurfaceError::serialization(
            "not a little-endian MAT v5 file",
        ));
    }

    let mut cur = ByteCursor::new(&buf[HEADER_LEN..]);
    let mut vars = Vec::new();
    while let Some((data_type, body)) = cur.element()? {
        match data_type {
            MI_MATRIX => vars.push(decode_matrix(body)?),
            MI_COMPRESSED => {
                return Err(SurfaceError::serialization(
                    "compressed MAT variables are not supported",
                ))
            }
            other => {
                tracing::debug!("Skipping top-level MAT element of type {}", other);
            }
        }
    }
    Ok(vars)
}

pub fn read_mat_file(path: &Path) -> SurfaceResult<Vec<MatVariable>> {
    read_mat(File::open(path)?)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write variables to `path` through a sibling temp file, so a failed
/// write never leaves a partial file under the final name
pub fn write_mat_file(path: &Path, vars: &[MatVariable]) -> SurfaceResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = temp_path(path);
    let result = (|| {
        let mut writer = MatWriter::new(BufWriter::new(File::create(&tmp)?))?;
        for var in vars {
            writer.write_variable(var)?;
        }
        writer.finish()?;
        Ok::<(), SurfaceError>(())
    })();

    match result {
        Ok(()) => {
            fs::rename(&tmp, path)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

fn bundle_variables(bundle: &SurfaceBundle) -> Vec<MatVariable> {
    let (nt, nx) = bundle.shape();

    let (re, im): (Vec<f32>, Vec<f32>) = bundle.uu.t().iter().map(|c| (c.re, c.im)).unzip();

    vec![
        MatVariable::row_vector("x", &bundle.x),
        MatVariable::row_vector("tt", &bundle.tt),
        MatVariable::new("uu", vec![nt, nx], MatData::ComplexF32 { re, im }),
        MatVariable::new(
            "features",
            bundle.features.shape().to_vec(),
            MatData::F32(bundle.features.t().iter().copied().collect()),
        ),
        MatVariable::new(
            "mask",
            vec![nt, nx],
            MatData::Logical(bundle.mask.t().iter().map(|&m| u8::from(m)).collect()),
        ),
        MatVariable::string("symbol", &bundle.symbol),
        MatVariable::string("expiry", &bundle.expiry),
    ]
}

/// Serialize a bundle. The bundle is validated first.
pub fn write_bundle(bundle: &SurfaceBundle, path: &Path) -> SurfaceResult<()> {
    bundle.validate()?;
    write_mat_file(path, &bundle_variables(bundle))?;
    tracing::info!("Wrote {} ({} x {} grid)", path.display(), bundle.tt.len(), bundle.x.len());
    Ok(())
}

fn take(vars: &mut HashMap<String, MatVariable>, name: &str) -> SurfaceResult<MatVariable> {
    vars.remove(name)
        .ok_or_else(|| SurfaceError::serialization(format!("missing entry '{}'", name)))
}

fn real_values(var: &MatVariable) -> SurfaceResult<Vec<f64>> {
    var.data
        .to_f64()
        .ok_or_else(|| SurfaceError::serialization(format!("entry '{}' is not numeric", var.name)))
}

fn matrix_dims(var: &MatVariable) -> SurfaceResult<(usize, usize)> {
    match var.dims.as_slice() {
        [r, c] => Ok((*r, *c)),
        _ => Err(SurfaceError::serialization(format!(
            "entry '{}' is not two-dimensional",
            var.name
        ))),
    }
}

fn shape_error(name: &str) -> impl Fn(ndarray::ShapeError) -> SurfaceError + '_ {
    move |e| SurfaceError::serialization(format!("entry '{}': {}", name, e))
}

fn text(var: MatVariable) -> SurfaceResult<String> {
    match var.data {
        MatData::Char(s) => Ok(s),
        _ => Err(SurfaceError::serialization(format!("entry '{}' is not text", var.name))),
    }
}

/// Load a bundle written by [`write_bundle`]
pub fn read_bundle(path: &Path) -> SurfaceResult<SurfaceBundle> {
    let mut vars: HashMap<String, MatVariable> = read_mat_file(path)?
        .into_iter()
        .map(|v| (v.name.clone(), v))
        .collect();

    let x = Array1::from(real_values(&take(&mut vars, "x")?)?);
    let tt = Array1::from(real_values(&take(&mut vars, "tt")?)?);

    let uu_var = take(&mut vars, "uu")?;
    let uu_shape = matrix_dims(&uu_var)?;
    let cells: Vec<Complex32> = match &uu_var.data {
        MatData::ComplexF32 { re, im } => re.iter().zip(im).map(|(&r, &i)| Complex32::new(r, i)).collect(),
        _ => real_values(&uu_var)?
            .into_iter()
            .map(|r| Complex32::new(r as f32, 0.0))
            .collect(),
    };
    let uu = Array2::from_shape_vec(uu_shape.f(), cells).map_err(shape_error("uu"))?;

    let feat_var = take(&mut vars, "features")?;
    let feat_values: Vec<f32> = real_values(&feat_var)?.into_iter().map(|v| v as f32).collect();
    let features = ArrayD::from_shape_vec(IxDyn(&feat_var.dims).f(), feat_values)
        .map_err(shape_error("features"))?;

    let mask_var = take(&mut vars, "mask")?;
    let mask_shape = matrix_dims(&mask_var)?;
    let flags: Vec<bool> = real_values(&mask_var)?.into_iter().map(|v| v != 0.0).collect();
    let mask = Array2::from_shape_vec(mask_shape.f(), flags).map_err(shape_error("mask"))?;

    let bundle = SurfaceBundle {
        x,
        tt,
        uu,
        features,
        mask,
        symbol: text(take(&mut vars, "symbol")?)?,
        expiry: text(take(&mut vars, "expiry")?)?,
    };
    bundle.validate()?;
    Ok(bundle)
}
