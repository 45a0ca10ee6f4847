use std::io::{Read, Write};
use std::rc::Rc;

use crate::error::Error;

/// Bit positions for `DiskWrite::bi_flags` and `DiskWrite::bi_rw`, mirroring
/// the block-layer capture tool's ABI. Only the 64-bit words are ever
/// serialized, so these positions must stay stable across tooling.
pub mod flags {
    // bi_rw bits.
    pub const WRITE: u64 = 1 << 0;
    pub const FLUSH: u64 = 1 << 1;
    pub const FLUSH_SEQ: u64 = 1 << 2;
    pub const FUA: u64 = 1 << 3;
    pub const META: u64 = 1 << 4;
    pub const SYNC: u64 = 1 << 5;

    // bi_flags bits.
    pub const CHECKPOINT: u64 = 1 << 0;
}

const FRAME_SIZE: usize = 4096;
const META_USED: usize = 40;

/// One block-layer I/O, as captured from a file-system workload. `data` is
/// `None` iff `size == 0`; payloads are immutable and reference-counted so
/// the halves of a split barrier can share one allocation.
#[derive(Clone, Debug)]
pub struct DiskWrite {
    pub bi_flags: u64,
    pub bi_rw: u64,
    pub write_sector: u64,
    pub size: u64,
    pub time_ns: u64,
    data: Option<Rc<[u8]>>,
}

impl DiskWrite {
    pub fn new(
        bi_flags: u64,
        bi_rw: u64,
        write_sector: u64,
        size: u64,
        time_ns: u64,
        payload: Option<&[u8]>,
    ) -> Self
    {
        let data = match payload {
            Some(bytes) if size > 0 => {
                assert_eq!(bytes.len() as u64, size, "payload length must equal size");
                Some(Rc::from(bytes))
            }
            _ => None,
        };

        Self {
            bi_flags,
            bi_rw,
            write_sector,
            size,
            time_ns,
            data,
        }
    }

    pub fn data(&self) -> Option<&[u8]>
    {
        self.data.as_deref()
    }

    pub fn is_write(&self) -> bool
    {
        self.bi_rw & flags::WRITE != 0
    }

    pub fn is_meta(&self) -> bool
    {
        self.bi_rw & flags::META != 0
    }

    pub fn is_checkpoint(&self) -> bool
    {
        self.bi_flags & flags::CHECKPOINT != 0
    }

    pub fn has_flush_flag(&self) -> bool
    {
        self.bi_rw & flags::FLUSH != 0
    }

    pub fn has_flush_seq_flag(&self) -> bool
    {
        self.bi_rw & flags::FLUSH_SEQ != 0
    }

    pub fn has_fua_flag(&self) -> bool
    {
        self.bi_rw & flags::FUA != 0
    }

    pub fn is_barrier(&self) -> bool
    {
        self.is_write() && (self.has_flush_flag() || self.has_flush_seq_flag() || self.has_fua_flag())
    }

    pub fn is_async_write(&self) -> bool
    {
        self.is_write() && self.bi_rw & flags::SYNC == 0
    }

    pub fn set_flush_flag(&mut self)
    {
        self.bi_rw |= flags::FLUSH;
    }

    pub fn clear_flush_flag(&mut self)
    {
        self.bi_rw &= !flags::FLUSH;
    }

    pub fn set_flush_seq_flag(&mut self)
    {
        self.bi_rw |= flags::FLUSH_SEQ;
    }

    pub fn clear_flush_seq_flag(&mut self)
    {
        self.bi_rw &= !flags::FLUSH_SEQ;
    }

    /// Splits a barrier-with-data op into a flag-half (no payload) and a
    /// data-half (payload intact, flush flags cleared).
    pub(crate) fn split_for_barrier(&self) -> (DiskWrite, DiskWrite)
    {
        let mut flag_half = self.clone();
        flag_half.size = 0;
        flag_half.data = None;

        let mut data_half = self.clone();
        if data_half.has_flush_flag() {
            data_half.clear_flush_flag();
        }
        if data_half.has_flush_seq_flag() {
            data_half.clear_flush_seq_flag();
        }

        (flag_half, data_half)
    }

    /// One 4096-byte metadata frame followed by `ceil(size / 4096)`
    /// 4096-byte data frames, the last zero-padded.
    pub fn serialize<W: Write>(&self, writer: &mut W) -> Result<(), Error>
    {
        let mut frame = [0u8; FRAME_SIZE];
        frame[0..8].copy_from_slice(&self.bi_flags.to_be_bytes());
        frame[8..16].copy_from_slice(&self.bi_rw.to_be_bytes());
        frame[16..24].copy_from_slice(&self.write_sector.to_be_bytes());
        frame[24..32].copy_from_slice(&self.size.to_be_bytes());
        frame[32..40].copy_from_slice(&self.time_ns.to_be_bytes());
        debug_assert!(frame[META_USED..].iter().all(|&b| b == 0));
        writer.write_all(&frame)?;

        if let Some(data) = &self.data {
            let mut offset = 0usize;
            while offset < data.len() {
                let mut buf = [0u8; FRAME_SIZE];
                let take = std::cmp::min(FRAME_SIZE, data.len() - offset);
                buf[..take].copy_from_slice(&data[offset..offset + take]);
                writer.write_all(&buf)?;
                offset += take;
            }
        }

        Ok(())
    }

    pub fn deserialize<R: Read>(reader: &mut R) -> Result<Self, Error>
    {
        let mut frame = [0u8; FRAME_SIZE];
        read_frame(reader, &mut frame)?;

        let bi_flags = u64::from_be_bytes(frame[0..8].try_into().unwrap());
        let bi_rw = u64::from_be_bytes(frame[8..16].try_into().unwrap());
        let write_sector = u64::from_be_bytes(frame[16..24].try_into().unwrap());
        let size = u64::from_be_bytes(frame[24..32].try_into().unwrap());
        let time_ns = u64::from_be_bytes(frame[32..40].try_into().unwrap());

        let data = if size > 0 {
            let num_frames = (size as usize + FRAME_SIZE - 1) / FRAME_SIZE;
            let mut buf = Vec::with_capacity(num_frames * FRAME_SIZE);
            for _ in 0..num_frames {
                let mut chunk = [0u8; FRAME_SIZE];
                read_frame(reader, &mut chunk)?;
                buf.extend_from_slice(&chunk);
            }
            buf.truncate(size as usize);
            Some(Rc::from(buf.into_boxed_slice()))
        } else {
            None
        };

        Ok(Self {
            bi_flags,
            bi_rw,
            write_sector,
            size,
            time_ns,
            data,
        })
    }

    pub fn describe_flags(&self) -> String
    {
        let mut parts = Vec::new();
        if self.is_write() {
            parts.push("write");
        }
        if self.has_flush_flag() {
            parts.push("flush");
        }
        if self.has_flush_seq_flag() {
            parts.push("flush_seq");
        }
        if self.has_fua_flag() {
            parts.push("fua");
        }
        if self.is_meta() {
            parts.push("meta");
        }
        if self.is_checkpoint() {
            parts.push("checkpoint");
        }
        if parts.is_empty() {
            "none".to_string()
        } else {
            parts.join("|")
        }
    }
}

fn read_frame<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), Error>
{
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(Error::Format("stream ended mid-frame".to_string()))
        }
        Err(e) => Err(Error::Io(e)),
    }
}

impl PartialEq for DiskWrite {
    fn eq(&self, other: &Self) -> bool
    {
        self.bi_flags == other.bi_flags
            && self.bi_rw == other.bi_rw
            && self.write_sector == other.write_sector
            && self.size == other.size
            && self.data.as_deref() == other.data.as_deref()
    }
}

impl Eq for DiskWrite {}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_op(sector: u64, size: u64, payload: u8) -> DiskWrite
    {
        let buf = vec![payload; size as usize];
        let payload = if size > 0 { Some(buf.as_slice()) } else { None };
        DiskWrite::new(0, flags::WRITE, sector, size, 0, payload)
    }

    #[test]
    fn predicates_plain_write()
    {
        let dw = write_op(0, 8, 0xAB);
        assert!(dw.is_write());
        assert!(!dw.is_barrier());
        assert!(!dw.is_meta());
        assert!(!dw.is_checkpoint());
    }

    #[test]
    fn predicates_fua_is_barrier()
    {
        let mut dw = write_op(0, 8, 0);
        dw.bi_rw |= flags::FUA;
        assert!(dw.is_barrier());
    }

    #[test]
    fn predicates_flush_without_write_is_not_barrier()
    {
        let dw = DiskWrite::new(0, flags::FLUSH, 0, 0, 0, None);
        assert!(!dw.is_barrier());
    }

    #[test]
    fn equality_ignores_time_ns()
    {
        let a = DiskWrite::new(0, flags::WRITE, 10, 0, 111, None);
        let b = DiskWrite::new(0, flags::WRITE, 10, 0, 999, None);
        assert_eq!(a, b);
    }

    #[test]
    fn equality_compares_payload_bytes()
    {
        let a = write_op(10, 4, 0xAA);
        let b = write_op(10, 4, 0xBB);
        assert_ne!(a, b);
    }

    #[test]
    fn roundtrip_various_sizes()
    {
        for &size in &[0u64, 1, 4095, 4096, 4097, 12288] {
            let dw = write_op(0x1234, size, 0xAB);
            let mut buf = Vec::new();
            dw.serialize(&mut buf).unwrap();

            // ceil(size/4096) data frames, 0 when size == 0.
            let data_frames = if size == 0 {
                0
            } else {
                (size as usize + FRAME_SIZE - 1) / FRAME_SIZE
            };
            assert_eq!(buf.len(), FRAME_SIZE * (1 + data_frames));

            let mut cursor = std::io::Cursor::new(buf);
            let back = DiskWrite::deserialize(&mut cursor).unwrap();
            assert_eq!(dw, back);
            assert_eq!(dw.time_ns, back.time_ns);
        }
    }

    #[test]
    fn serialize_5000_byte_record_matches_byte_layout()
    {
        let dw = write_op(0x1234, 5000, 0xAB);
        let mut buf = Vec::new();
        dw.serialize(&mut buf).unwrap();

        assert_eq!(buf.len(), 12288);
        assert_eq!(u64::from_be_bytes(buf[0..8].try_into().unwrap()), 0);
        assert_eq!(u64::from_be_bytes(buf[16..24].try_into().unwrap()), 0x1234);
        assert_eq!(u64::from_be_bytes(buf[24..32].try_into().unwrap()), 5000);
        assert!(buf[4096..9096].iter().all(|&b| b == 0xAB));
        assert!(buf[9096..12288].iter().all(|&b| b == 0));

        let mut cursor = std::io::Cursor::new(buf);
        let back = DiskWrite::deserialize(&mut cursor).unwrap();
        assert_eq!(dw, back);
    }

    #[test]
    fn deserialize_truncated_stream_is_format_error()
    {
        let short = vec![0u8; 10];
        let mut cursor = std::io::Cursor::new(short);
        match DiskWrite::deserialize(&mut cursor) {
            Err(Error::Format(_)) => {}
            other => panic!("expected Format error, got {other:?}"),
        }
    }

    #[test]
    fn split_for_barrier_clears_flush_on_data_half_only()
    {
        let mut dw = write_op(16, 8, 0x11);
        dw.set_flush_flag();

        let (flag_half, data_half) = dw.split_for_barrier();

        assert_eq!(flag_half.size, 0);
        assert!(flag_half.data().is_none());
        assert!(flag_half.has_flush_flag());

        assert_eq!(data_half.size, 8);
        assert!(data_half.data().is_some());
        assert!(!data_half.has_flush_flag());
    }
}
