//! ZIP records as laid out in the APPNOTE.

use crate::error::{Result, format_err};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

pub const LFH_SIGNATURE: u32 = 0x0403_4b50;
pub const CDFH_SIGNATURE: u32 = 0x0201_4b50;
pub const DESCRIPTOR_SIGNATURE: u32 = 0x0807_4b50;
pub const LFH_SIZE: u64 = 30;
pub const CDFH_MIN_SIZE: u64 = 46;

pub const FLAG_ENCRYPTED: u16 = 0x0001;
pub const FLAG_DESCRIPTOR: u16 = 0x0008;
pub const FLAG_UTF8: u16 = 0x0800;

pub const VERSION_NEEDED: u16 = 20;
pub const HOST_UNIX: u16 = 3;

const EXTRA_ZIP64: u16 = 0x0001;
const EXTRA_TIMESTAMP: u16 = 0x5455;

pub const S_IFMT: u32 = 0o170_000;
pub const S_IFREG: u32 = 0o100_000;
pub const S_IFDIR: u32 = 0o040_000;
pub const S_IFLNK: u32 = 0o120_000;
/// MS-DOS directory attribute.
pub const DOS_DIR: u32 = 0x10;

/// End of Central Directory, with ZIP64 values folded in when present.
#[derive(Debug, Clone, Copy)]
pub struct EndOfCentralDirectory {
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;
    pub const MAX_COMMENT: usize = 65535;

    pub fn from_bytes(data: &[u8]) -> Result<(Self, bool)> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(format_err("invalid end of central directory"));
        }
        let mut c = Cursor::new(&data[4..]);
        let _disk = c.read_u16::<LittleEndian>()?;
        let _disk_with_cd = c.read_u16::<LittleEndian>()?;
        let disk_entries = c.read_u16::<LittleEndian>()?;
        let total_entries = c.read_u16::<LittleEndian>()?;
        let cd_size = c.read_u32::<LittleEndian>()?;
        let cd_offset = c.read_u32::<LittleEndian>()?;
        let zip64 = disk_entries == 0xFFFF
            || total_entries == 0xFFFF
            || cd_size == 0xFFFF_FFFF
            || cd_offset == 0xFFFF_FFFF;
        Ok((
            Self {
                total_entries: u64::from(total_entries),
                cd_size: u64::from(cd_size),
                cd_offset: u64::from(cd_offset),
            },
            zip64,
        ))
    }

    /// Finds the record in the tail of an archive, allowing for a trailing
    /// comment. Returns the record's offset within `tail`.
    pub fn locate(tail: &[u8]) -> Option<usize> {
        if tail.len() < Self::SIZE {
            return None;
        }
        (0..=tail.len() - Self::SIZE).rev().find(|&i| {
            &tail[i..i + 4] == Self::SIGNATURE && {
                let comment = u16::from_le_bytes([tail[i + 20], tail[i + 21]]) as usize;
                comment == tail.len() - i - Self::SIZE
            }
        })
    }

    pub fn write(w: &mut dyn Write, entries: u16, cd_size: u32, cd_offset: u32) -> Result<()> {
        w.write_all(Self::SIGNATURE)?;
        w.write_u16::<LittleEndian>(0)?;
        w.write_u16::<LittleEndian>(0)?;
        w.write_u16::<LittleEndian>(entries)?;
        w.write_u16::<LittleEndian>(entries)?;
        w.write_u32::<LittleEndian>(cd_size)?;
        w.write_u32::<LittleEndian>(cd_offset)?;
        w.write_u16::<LittleEndian>(0)?;
        Ok(())
    }
}

pub struct Zip64Locator;

impl Zip64Locator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn eocd64_offset(data: &[u8]) -> Result<u64> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(format_err("invalid zip64 locator"));
        }
        let mut c = Cursor::new(&data[8..16]);
        Ok(c.read_u64::<LittleEndian>()?)
    }
}

pub struct Zip64Eocd;

impl Zip64Eocd {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<EndOfCentralDirectory> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(format_err("invalid zip64 end of central directory"));
        }
        let mut c = Cursor::new(&data[24..]);
        let _disk_entries = c.read_u64::<LittleEndian>()?;
        Ok(EndOfCentralDirectory {
            total_entries: c.read_u64::<LittleEndian>()?,
            cd_size: c.read_u64::<LittleEndian>()?,
            cd_offset: c.read_u64::<LittleEndian>()?,
        })
    }
}

/// One central directory file header.
#[derive(Debug, Clone)]
pub struct CentralRecord {
    pub name: String,
    pub version_made_by: u16,
    pub flags: u16,
    pub method: u16,
    pub dos_time: u16,
    pub dos_date: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub external_attrs: u32,
    pub lfh_offset: u64,
    /// From the extended timestamp extra field, when present.
    pub mtime: Option<i64>,
}

impl CentralRecord {
    pub fn parse(c: &mut Cursor<&[u8]>) -> Result<Self> {
        if c.read_u32::<LittleEndian>()? != CDFH_SIGNATURE {
            return Err(format_err("invalid central directory file header"));
        }
        let version_made_by = c.read_u16::<LittleEndian>()?;
        let _version_needed = c.read_u16::<LittleEndian>()?;
        let flags = c.read_u16::<LittleEndian>()?;
        let method = c.read_u16::<LittleEndian>()?;
        let dos_time = c.read_u16::<LittleEndian>()?;
        let dos_date = c.read_u16::<LittleEndian>()?;
        let crc32 = c.read_u32::<LittleEndian>()?;
        let mut compressed_size = u64::from(c.read_u32::<LittleEndian>()?);
        let mut uncompressed_size = u64::from(c.read_u32::<LittleEndian>()?);
        let name_len = c.read_u16::<LittleEndian>()?;
        let extra_len = c.read_u16::<LittleEndian>()?;
        let comment_len = c.read_u16::<LittleEndian>()?;
        let _disk_start = c.read_u16::<LittleEndian>()?;
        let _internal_attrs = c.read_u16::<LittleEndian>()?;
        let external_attrs = c.read_u32::<LittleEndian>()?;
        let mut lfh_offset = u64::from(c.read_u32::<LittleEndian>()?);

        let mut name = vec![0u8; name_len as usize];
        c.read_exact(&mut name)?;
        let name = String::from_utf8_lossy(&name).into_owned();

        let mut extra = vec![0u8; extra_len as usize];
        c.read_exact(&mut extra)?;
        let mut mtime = None;
        for (id, body) in extra_fields(&extra) {
            match id {
                EXTRA_ZIP64 => {
                    let mut z = Cursor::new(body);
                    if uncompressed_size == 0xFFFF_FFFF {
                        uncompressed_size = z.read_u64::<LittleEndian>()?;
                    }
                    if compressed_size == 0xFFFF_FFFF {
                        compressed_size = z.read_u64::<LittleEndian>()?;
                    }
                    if lfh_offset == 0xFFFF_FFFF {
                        lfh_offset = z.read_u64::<LittleEndian>()?;
                    }
                }
                EXTRA_TIMESTAMP if body.len() >= 5 && body[0] & 1 != 0 => {
                    let t = u32::from_le_bytes([body[1], body[2], body[3], body[4]]);
                    mtime = Some(i64::from(t as i32));
                }
                _ => {}
            }
        }
        c.set_position(c.position() + u64::from(comment_len));

        Ok(Self {
            name,
            version_made_by,
            flags,
            method,
            dos_time,
            dos_date,
            crc32,
            compressed_size,
            uncompressed_size,
            external_attrs,
            lfh_offset,
            mtime,
        })
    }

    pub fn write(&self, w: &mut dyn Write) -> Result<()> {
        let extra = timestamp_extra(self.mtime.unwrap_or(0));
        w.write_u32::<LittleEndian>(CDFH_SIGNATURE)?;
        w.write_u16::<LittleEndian>(self.version_made_by)?;
        w.write_u16::<LittleEndian>(VERSION_NEEDED)?;
        w.write_u16::<LittleEndian>(self.flags)?;
        w.write_u16::<LittleEndian>(self.method)?;
        w.write_u16::<LittleEndian>(self.dos_time)?;
        w.write_u16::<LittleEndian>(self.dos_date)?;
        w.write_u32::<LittleEndian>(self.crc32)?;
        w.write_u32::<LittleEndian>(self.compressed_size as u32)?;
        w.write_u32::<LittleEndian>(self.uncompressed_size as u32)?;
        w.write_u16::<LittleEndian>(self.name.len() as u16)?;
        w.write_u16::<LittleEndian>(extra.len() as u16)?;
        w.write_u16::<LittleEndian>(0)?;
        w.write_u16::<LittleEndian>(0)?;
        w.write_u16::<LittleEndian>(0)?;
        w.write_u32::<LittleEndian>(self.external_attrs)?;
        w.write_u32::<LittleEndian>(self.lfh_offset as u32)?;
        w.write_all(self.name.as_bytes())?;
        w.write_all(&extra)?;
        Ok(())
    }

    pub fn is_unix(&self) -> bool {
        self.version_made_by >> 8 == HOST_UNIX
    }

    /// Unix `st_mode` carried in the high half of the external attributes.
    pub fn unix_mode(&self) -> Option<u32> {
        let m = self.external_attrs >> 16;
        (self.is_unix() && m != 0).then_some(m)
    }
}

/// Splits an extra field block into `(id, body)` pairs, stopping at the
/// first truncated one.
pub fn extra_fields(mut data: &[u8]) -> Vec<(u16, &[u8])> {
    let mut out = Vec::new();
    while data.len() >= 4 {
        let id = u16::from_le_bytes([data[0], data[1]]);
        let len = u16::from_le_bytes([data[2], data[3]]) as usize;
        if data.len() < 4 + len {
            break;
        }
        out.push((id, &data[4..4 + len]));
        data = &data[4 + len..];
    }
    out
}

/// Extended timestamp extra field carrying only the modification time.
pub fn timestamp_extra(mtime: i64) -> [u8; 9] {
    let t = (mtime.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32).to_le_bytes();
    let id = EXTRA_TIMESTAMP.to_le_bytes();
    [id[0], id[1], 5, 0, 1, t[0], t[1], t[2], t[3]]
}

/// MS-DOS date and time, read as UTC. Out-of-range fields give the epoch.
pub fn dos_to_unix(date: u16, time: u16) -> i64 {
    let year = i32::from((date >> 9) & 0x7F) + 1980;
    let month = ((date >> 5) & 0x0F) as u8;
    let day = (date & 0x1F) as u8;
    let hour = ((time >> 11) & 0x1F) as u8;
    let minute = ((time >> 5) & 0x3F) as u8;
    let second = ((time & 0x1F) * 2) as u8;
    Month::try_from(month)
        .ok()
        .and_then(|m| Date::from_calendar_date(year, m, day).ok())
        .zip(Time::from_hms(hour, minute, second.min(59)).ok())
        .map(|(d, t)| PrimitiveDateTime::new(d, t).assume_utc().unix_timestamp())
        .unwrap_or(0)
}

/// Returns `(time, date)`; instants before 1980 clamp to 1980-01-01.
pub fn unix_to_dos(mtime: i64) -> (u16, u16) {
    let t = OffsetDateTime::from_unix_timestamp(mtime).unwrap_or(OffsetDateTime::UNIX_EPOCH);
    if t.year() < 1980 {
        return (0, (1 << 5) | 1);
    }
    let year = (t.year().min(2107) - 1980) as u16;
    let date = (year << 9) | ((u8::from(t.month()) as u16) << 5) | u16::from(t.day());
    let time = (u16::from(t.hour()) << 11) | (u16::from(t.minute()) << 5) | u16::from(t.second() / 2);
    (time, date)
}
