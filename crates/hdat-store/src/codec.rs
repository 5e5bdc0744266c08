//! Binary result artifact format (`.hdat`).
//!
//! One artifact holds one [`ResultRecord`], context included. Layout, all
//! integers little-endian:
//!
//! ```text
//! magic        8   "HDATRSLT"
//! version      4   RESULT_FORMAT_VERSION
//! header_len   4
//! header       header_len   suite_id, case_id, result_id, commit,
//!                           repo_dirty u8, ran_on f64 bits, status u8
//! body_len     8
//! body         body_len     case_input (JSON), metrics, context
//! checksum     8   xxh3_64 of every preceding byte
//! ```
//!
//! The header comes first and carries `ran_on`, so recency sorting can read
//! a bounded prefix of the file instead of decoding a possibly huge context.
//! Floats are stored by bit pattern and arrays as raw element bytes, so a
//! decoded record is bit-identical to the encoded one.

use std::collections::BTreeMap;
use std::io::Read;

use hdat_error::{HdatError, Result};
use hdat_types::{ArrayData, Context, MetricValue, Metrics, ResultRecord, Status};
use xxhash_rust::xxh3::xxh3_64;

/// Magic bytes opening every result artifact.
pub const RESULT_MAGIC: [u8; 8] = *b"HDATRSLT";
/// Current artifact format version.
pub const RESULT_FORMAT_VERSION: u32 = 1;
/// File extension of result artifacts, without the dot.
pub const RESULT_FILE_EXTENSION: &str = "hdat";

const PREAMBLE_BYTES: usize = 8 + 4 + 4;
const CHECKSUM_BYTES: usize = 8;
const MAX_HEADER_BYTES: usize = 1 << 20;
const MAX_CONTEXT_DEPTH: usize = 64;

const METRIC_BOOL: u8 = 0;
const METRIC_INT: u8 = 1;
const METRIC_FLOAT: u8 = 2;
const METRIC_TEXT: u8 = 3;

const CONTEXT_EMPTY: u8 = 0;
const CONTEXT_BYTES: u8 = 1;
const CONTEXT_JSON: u8 = 2;
const CONTEXT_ARRAY: u8 = 3;
const CONTEXT_FIELDS: u8 = 4;

const ARRAY_U8: u8 = 0;
const ARRAY_I64: u8 = 1;
const ARRAY_F64: u8 = 2;

/// Identity and timing fields of an artifact, readable without the body.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactHeader {
    pub suite_id: String,
    pub case_id: String,
    pub result_id: String,
    pub commit: String,
    pub repo_dirty: bool,
    pub ran_on: f64,
    pub status: Status,
}

/// Encode a full result artifact.
pub fn encode_result(result: &ResultRecord) -> Result<Vec<u8>> {
    let mut header = Encoder::default();
    header.put_str(&result.suite_id)?;
    header.put_str(&result.case_id)?;
    header.put_str(&result.result_id)?;
    header.put_str(&result.commit)?;
    header.put_u8(u8::from(result.repo_dirty));
    header.put_f64(result.ran_on);
    header.put_u8(result.status.wire_tag());

    let mut body = Encoder::default();
    let case_input = serde_json::to_vec(&result.case_input)?;
    body.put_blob(&case_input);
    body.put_len32(result.metrics.len(), "metric count")?;
    for (name, value) in &result.metrics {
        body.put_str(name)?;
        encode_metric(&mut body, value)?;
    }
    encode_context(&mut body, &result.context)?;

    let header_len = u32::try_from(header.buf.len())
        .map_err(|_| HdatError::corrupt("artifact header exceeds u32 length"))?;

    let mut out =
        Vec::with_capacity(PREAMBLE_BYTES + header.buf.len() + 8 + body.buf.len() + CHECKSUM_BYTES);
    out.extend_from_slice(&RESULT_MAGIC);
    out.extend_from_slice(&RESULT_FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header.buf);
    out.extend_from_slice(&(body.buf.len() as u64).to_le_bytes());
    out.extend_from_slice(&body.buf);
    let checksum = xxh3_64(&out);
    out.extend_from_slice(&checksum.to_le_bytes());
    Ok(out)
}

/// Decode and fully verify a result artifact.
pub fn decode_result(bytes: &[u8]) -> Result<ResultRecord> {
    if bytes.len() < PREAMBLE_BYTES + CHECKSUM_BYTES {
        return Err(HdatError::corrupt(format!(
            "artifact too short: expected at least {} bytes, got {}",
            PREAMBLE_BYTES + CHECKSUM_BYTES,
            bytes.len()
        )));
    }
    let (content, trailer) = bytes.split_at(bytes.len() - CHECKSUM_BYTES);
    let mut stored = [0u8; CHECKSUM_BYTES];
    stored.copy_from_slice(trailer);
    let stored = u64::from_le_bytes(stored);
    let computed = xxh3_64(content);
    if stored != computed {
        return Err(HdatError::corrupt(format!(
            "checksum mismatch: stored {stored:#018x}, computed {computed:#018x}"
        )));
    }

    let mut decoder = Decoder::new(content);
    let header_len = read_preamble(&mut decoder)?;
    let header = decode_header_fields(&mut Decoder::new(decoder.take(header_len, "header")?))?;

    let body_len = decoder.len64("body length")?;
    let mut body = Decoder::new(decoder.take(body_len, "body")?);
    decoder.finish("artifact")?;

    let case_input = serde_json::from_slice(body.blob("case_input")?)
        .map_err(|err| HdatError::corrupt(format!("case_input is not valid JSON: {err}")))?;
    let metric_count = body.count32("metric count", 2)?;
    let mut metrics = Metrics::new();
    for _ in 0..metric_count {
        let name = body.string("metric name")?;
        let value = decode_metric(&mut body)?;
        if metrics.insert(name.clone(), value).is_some() {
            return Err(HdatError::corrupt(format!("duplicate metric \"{name}\"")));
        }
    }
    let context = decode_context(&mut body, 0)?;
    body.finish("body")?;

    Ok(ResultRecord {
        suite_id: header.suite_id,
        case_id: header.case_id,
        result_id: header.result_id,
        case_input,
        metrics,
        context,
        commit: header.commit,
        repo_dirty: header.repo_dirty,
        ran_on: header.ran_on,
        status: header.status,
    })
}

/// Read only the header from the start of an artifact stream.
///
/// The checksum is not verified; callers that need integrity decode the
/// whole artifact.
pub fn read_header(reader: &mut impl Read) -> Result<ArtifactHeader> {
    let mut preamble = [0u8; PREAMBLE_BYTES];
    reader
        .read_exact(&mut preamble)
        .map_err(|err| HdatError::corrupt(format!("truncated preamble: {err}")))?;
    let header_len = read_preamble(&mut Decoder::new(&preamble))?;
    if header_len > MAX_HEADER_BYTES {
        return Err(HdatError::corrupt(format!(
            "header length {header_len} exceeds limit {MAX_HEADER_BYTES}"
        )));
    }
    let mut header = vec![0u8; header_len];
    reader
        .read_exact(&mut header)
        .map_err(|err| HdatError::corrupt(format!("truncated header: {err}")))?;
    decode_header_fields(&mut Decoder::new(&header))
}

fn read_preamble(decoder: &mut Decoder<'_>) -> Result<usize> {
    let magic = decoder.array::<8>("magic")?;
    if magic != RESULT_MAGIC {
        return Err(HdatError::corrupt(format!("invalid magic: {magic:02x?}")));
    }
    let version = decoder.u32("version")?;
    if version != RESULT_FORMAT_VERSION {
        return Err(HdatError::corrupt(format!(
            "unsupported format version {version}, expected {RESULT_FORMAT_VERSION}"
        )));
    }
    let header_len = decoder.u32("header length")?;
    usize::try_from(header_len).map_err(|_| HdatError::corrupt("header length overflows usize"))
}

fn decode_header_fields(decoder: &mut Decoder<'_>) -> Result<ArtifactHeader> {
    let suite_id = decoder.string("suite_id")?;
    let case_id = decoder.string("case_id")?;
    let result_id = decoder.string("result_id")?;
    let commit = decoder.string("commit")?;
    let repo_dirty = match decoder.u8("repo_dirty")? {
        0 => false,
        1 => true,
        other => {
            return Err(HdatError::corrupt(format!("invalid repo_dirty byte {other}")));
        }
    };
    let ran_on = decoder.f64("ran_on")?;
    let tag = decoder.u8("status")?;
    let status = Status::from_wire_tag(tag)
        .ok_or_else(|| HdatError::corrupt(format!("invalid status tag {tag}")))?;
    decoder.finish("header")?;
    Ok(ArtifactHeader {
        suite_id,
        case_id,
        result_id,
        commit,
        repo_dirty,
        ran_on,
        status,
    })
}

fn encode_metric(encoder: &mut Encoder, value: &MetricValue) -> Result<()> {
    match value {
        MetricValue::Bool(flag) => {
            encoder.put_u8(METRIC_BOOL);
            encoder.put_u8(u8::from(*flag));
        }
        MetricValue::Int(number) => {
            encoder.put_u8(METRIC_INT);
            encoder.buf.extend_from_slice(&number.to_le_bytes());
        }
        MetricValue::Float(number) => {
            encoder.put_u8(METRIC_FLOAT);
            encoder.put_f64(*number);
        }
        MetricValue::Text(text) => {
            encoder.put_u8(METRIC_TEXT);
            encoder.put_str(text)?;
        }
    }
    Ok(())
}

fn decode_metric(decoder: &mut Decoder<'_>) -> Result<MetricValue> {
    match decoder.u8("metric tag")? {
        METRIC_BOOL => match decoder.u8("metric bool")? {
            0 => Ok(MetricValue::Bool(false)),
            1 => Ok(MetricValue::Bool(true)),
            other => Err(HdatError::corrupt(format!("invalid metric bool byte {other}"))),
        },
        METRIC_INT => Ok(MetricValue::Int(i64::from_le_bytes(
            decoder.array::<8>("metric int")?,
        ))),
        METRIC_FLOAT => Ok(MetricValue::Float(decoder.f64("metric float")?)),
        METRIC_TEXT => Ok(MetricValue::Text(decoder.string("metric text")?)),
        other => Err(HdatError::corrupt(format!("invalid metric tag {other}"))),
    }
}

fn encode_context(encoder: &mut Encoder, context: &Context) -> Result<()> {
    match context {
        Context::Empty => encoder.put_u8(CONTEXT_EMPTY),
        Context::Bytes(bytes) => {
            encoder.put_u8(CONTEXT_BYTES);
            encoder.put_blob(bytes);
        }
        Context::Json(value) => {
            encoder.put_u8(CONTEXT_JSON);
            encoder.put_blob(&serde_json::to_vec(value)?);
        }
        Context::Array { shape, data } => {
            encoder.put_u8(CONTEXT_ARRAY);
            encoder.put_len32(shape.len(), "array rank")?;
            for dim in shape {
                encoder.put_u64(*dim);
            }
            match data {
                ArrayData::U8(values) => {
                    encoder.put_u8(ARRAY_U8);
                    encoder.put_blob(values);
                }
                ArrayData::I64(values) => {
                    encoder.put_u8(ARRAY_I64);
                    encoder.put_u64(values.len() as u64);
                    for value in values {
                        encoder.buf.extend_from_slice(&value.to_le_bytes());
                    }
                }
                ArrayData::F64(values) => {
                    encoder.put_u8(ARRAY_F64);
                    encoder.put_u64(values.len() as u64);
                    for value in values {
                        encoder.put_f64(*value);
                    }
                }
            }
        }
        Context::Fields(fields) => {
            encoder.put_u8(CONTEXT_FIELDS);
            encoder.put_len32(fields.len(), "context field count")?;
            for (name, child) in fields {
                encoder.put_str(name)?;
                encode_context(encoder, child)?;
            }
        }
    }
    Ok(())
}

fn decode_context(decoder: &mut Decoder<'_>, depth: usize) -> Result<Context> {
    if depth > MAX_CONTEXT_DEPTH {
        return Err(HdatError::corrupt(format!(
            "context nesting deeper than {MAX_CONTEXT_DEPTH}"
        )));
    }
    match decoder.u8("context tag")? {
        CONTEXT_EMPTY => Ok(Context::Empty),
        CONTEXT_BYTES => Ok(Context::Bytes(decoder.blob("context bytes")?.to_vec())),
        CONTEXT_JSON => serde_json::from_slice(decoder.blob("context json")?)
            .map(Context::Json)
            .map_err(|err| HdatError::corrupt(format!("context json is invalid: {err}"))),
        CONTEXT_ARRAY => {
            let rank = decoder.count32("array rank", 8)?;
            let mut shape = Vec::with_capacity(rank);
            for _ in 0..rank {
                shape.push(decoder.u64("array dim")?);
            }
            let data = match decoder.u8("array element tag")? {
                ARRAY_U8 => ArrayData::U8(decoder.blob("array u8 data")?.to_vec()),
                ARRAY_I64 => {
                    let count = decoder.count64("array i64 count", 8)?;
                    let mut values = Vec::with_capacity(count);
                    for _ in 0..count {
                        values.push(i64::from_le_bytes(decoder.array::<8>("array i64")?));
                    }
                    ArrayData::I64(values)
                }
                ARRAY_F64 => {
                    let count = decoder.count64("array f64 count", 8)?;
                    let mut values = Vec::with_capacity(count);
                    for _ in 0..count {
                        values.push(decoder.f64("array f64")?);
                    }
                    ArrayData::F64(values)
                }
                other => {
                    return Err(HdatError::corrupt(format!("invalid array element tag {other}")));
                }
            };
            Context::array(shape, data)
                .ok_or_else(|| HdatError::corrupt("array shape does not match element count"))
        }
        CONTEXT_FIELDS => {
            let count = decoder.count32("context field count", 5)?;
            let mut fields = BTreeMap::new();
            for _ in 0..count {
                let name = decoder.string("context field name")?;
                let child = decode_context(decoder, depth + 1)?;
                if fields.insert(name.clone(), child).is_some() {
                    return Err(HdatError::corrupt(format!(
                        "duplicate context field \"{name}\""
                    )));
                }
            }
            Ok(Context::Fields(fields))
        }
        other => Err(HdatError::corrupt(format!("invalid context tag {other}"))),
    }
}

#[derive(Default)]
struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn put_f64(&mut self, value: f64) {
        self.put_u64(value.to_bits());
    }

    fn put_len32(&mut self, len: usize, what: &str) -> Result<()> {
        let len = u32::try_from(len)
            .map_err(|_| HdatError::corrupt(format!("{what} {len} exceeds u32")))?;
        self.buf.extend_from_slice(&len.to_le_bytes());
        Ok(())
    }

    fn put_str(&mut self, value: &str) -> Result<()> {
        self.put_len32(value.len(), "string length")?;
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    fn put_blob(&mut self, value: &[u8]) {
        self.put_u64(value.len() as u64);
        self.buf.extend_from_slice(value);
    }
}

struct Decoder<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> Decoder<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    const fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(HdatError::corrupt(format!(
                "field {field} out of bounds: need {len} bytes at offset {}, total {}",
                self.cursor,
                self.bytes.len()
            )));
        }
        let slice = &self.bytes[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, field: &str) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    fn u8(&mut self, field: &str) -> Result<u8> {
        Ok(self.array::<1>(field)?[0])
    }

    fn u32(&mut self, field: &str) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array::<4>(field)?))
    }

    fn u64(&mut self, field: &str) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array::<8>(field)?))
    }

    fn f64(&mut self, field: &str) -> Result<f64> {
        Ok(f64::from_bits(self.u64(field)?))
    }

    fn len64(&mut self, field: &str) -> Result<usize> {
        let len = self.u64(field)?;
        usize::try_from(len)
            .map_err(|_| HdatError::corrupt(format!("{field} {len} overflows usize")))
    }

    /// Element count whose elements take at least `min_element_bytes`
    /// each; rejects counts the remaining input cannot possibly hold.
    fn bounded(&self, count: usize, min_element_bytes: usize, field: &str) -> Result<usize> {
        if count.saturating_mul(min_element_bytes) > self.remaining() {
            return Err(HdatError::corrupt(format!(
                "{field} {count} exceeds remaining {} bytes",
                self.remaining()
            )));
        }
        Ok(count)
    }

    fn count32(&mut self, field: &str, min_element_bytes: usize) -> Result<usize> {
        let count = self.u32(field)? as usize;
        self.bounded(count, min_element_bytes, field)
    }

    fn count64(&mut self, field: &str, min_element_bytes: usize) -> Result<usize> {
        let count = self.len64(field)?;
        self.bounded(count, min_element_bytes, field)
    }

    fn blob(&mut self, field: &str) -> Result<&'a [u8]> {
        let len = self.len64(field)?;
        self.take(len, field)
    }

    fn string(&mut self, field: &str) -> Result<String> {
        let len = self.u32(field)? as usize;
        let raw = self.take(len, field)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| HdatError::corrupt(format!("field {field} is not valid UTF-8")))
    }

    fn finish(&self, what: &str) -> Result<()> {
        if self.cursor == self.bytes.len() {
            Ok(())
        } else {
            Err(HdatError::corrupt(format!(
                "{what} trailing bytes: consumed {}, total {}",
                self.cursor,
                self.bytes.len()
            )))
        }
    }
}
