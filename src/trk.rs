//! Functions for reading and writing TrackVis streamline files in binary 'trk' format.
//!
//! A trk file starts with a 1000 byte header, followed by the tracks. Each track is stored as
//! its number of points, then the point coordinates (each followed by `n_scalars` per-point
//! values), then `n_properties` per-track values. The file may be written in either byte order;
//! the `hdr_size` field, which must be 1000, tells which one.

use byteordered::{ByteOrdered, Endianness};
use flate2::bufread::GzDecoder;

use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, ErrorKind, Read, Write};
use std::path::Path;

use crate::error::{Result, TractmapError};
use crate::streamline::Streamline;
use crate::util::{fixed_length_bytes, in_file, is_gz_file, read_fixed_length_string};

pub const TRK_MAGIC: &str = "TRACK";
pub const TRK_HEADER_SIZE: usize = 1000;
pub const TRK_VERSION: i32 = 2;
const TRK_NAME_SLOTS: usize = 10;
const TRK_NAME_LEN: usize = 20;
const HDR_SIZE_OFFSET: usize = 996;
/// Counts read from the file only size allocations up to this; vectors grow as data actually arrives.
const MAX_PREALLOC: usize = 4096;

/// Models the header of a TrackVis trk file.
#[derive(Debug, Clone, PartialEq)]
pub struct TrkHeader {
    pub id_string: String,
    pub dim: [i16; 3],
    pub voxel_size: [f32; 3],
    pub origin: [f32; 3],
    pub n_scalars: i16,
    pub scalar_names: Vec<String>,
    pub n_properties: i16,
    pub property_names: Vec<String>,
    pub vox_to_ras: [[f32; 4]; 4],
    pub voxel_order: String,
    pub image_orientation_patient: [f32; 6],
    pub invert: [u8; 3],
    pub swap: [u8; 3], // swap_xy, swap_yz, swap_zx
    pub n_count: i32,  // 0 means the number of tracks is not stored.
    pub version: i32,
    pub hdr_size: i32,
}


impl Default for TrkHeader {
    fn default() -> TrkHeader {
        TrkHeader {
            id_string: String::from(TRK_MAGIC),
            dim: [0; 3],
            voxel_size: [1.; 3],
            origin: [0.; 3],
            n_scalars: 0,
            scalar_names: vec![String::new(); TRK_NAME_SLOTS],
            n_properties: 0,
            property_names: vec![String::new(); TRK_NAME_SLOTS],
            vox_to_ras: [[0.; 4]; 4],
            voxel_order: String::from("LPS"),
            image_orientation_patient: [0.; 6],
            invert: [0; 3],
            swap: [0; 3],
            n_count: 0,
            version: TRK_VERSION,
            hdr_size: TRK_HEADER_SIZE as i32,
        }
    }
}


impl TrkHeader {

    /// Read a trk header from a file.
    /// If the file's name ends with ".gz", the file is assumed to need GZip decoding.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<TrkHeader> {
        let path = path.as_ref();
        let read = || -> Result<TrkHeader> {
            let mut file = BufReader::new(File::open(path)?);
            let (hdr, _) = if is_gz_file(path) {
                TrkHeader::from_reader(&mut GzDecoder::new(file))?
            } else {
                TrkHeader::from_reader(&mut file)?
            };
            Ok(hdr)
        };
        in_file(path, read())
    }


    /// Read a trk header from the given byte stream, which must be at the start of the file.
    /// Returns the header and the byte order of the file, which the track data shares.
    pub fn from_reader<S>(input: &mut S) -> Result<(TrkHeader, Endianness)>
    where
        S: Read,
    {
        let mut raw = [0u8; TRK_HEADER_SIZE];
        input.read_exact(&mut raw)?;

        let endianness = detect_endianness(&raw)?;
        let mut hdr = TrkHeader::default();
        let mut cursor = Cursor::new(&raw[..]);

        hdr.id_string = read_fixed_length_string(&mut cursor, 6)?;
        if hdr.id_string != TRK_MAGIC {
            return Err(TractmapError::InvalidTrkFormat(format!("bad magic '{}'", hdr.id_string)));
        }

        let mut input = ByteOrdered::runtime(cursor, endianness);

        for idx in 0..3 { hdr.dim[idx] = input.read_i16()?; }
        for idx in 0..3 { hdr.voxel_size[idx] = input.read_f32()?; }
        for idx in 0..3 { hdr.origin[idx] = input.read_f32()?; }

        hdr.n_scalars = input.read_i16()?;
        hdr.scalar_names = read_name_slots(&mut input)?;
        hdr.n_properties = input.read_i16()?;
        hdr.property_names = read_name_slots(&mut input)?;

        for row in 0..4 {
            for col in 0..4 {
                hdr.vox_to_ras[row][col] = input.read_f32()?;
            }
        }

        let _reserved = read_fixed_length_string(&mut input, 444)?;
        hdr.voxel_order = read_fixed_length_string(&mut input, 4)?;
        let _pad2 = read_fixed_length_string(&mut input, 4)?;
        for idx in 0..6 { hdr.image_orientation_patient[idx] = input.read_f32()?; }
        let _pad1 = read_fixed_length_string(&mut input, 2)?;
        for idx in 0..3 { hdr.invert[idx] = input.read_u8()?; }
        for idx in 0..3 { hdr.swap[idx] = input.read_u8()?; }

        hdr.n_count = input.read_i32()?;
        hdr.version = input.read_i32()?;
        hdr.hdr_size = input.read_i32()?;

        if hdr.n_scalars < 0 || hdr.n_properties < 0 {
            return Err(TractmapError::InvalidTrkFormat(format!(
                "negative scalar ({}) or property ({}) count", hdr.n_scalars, hdr.n_properties)));
        }

        Ok((hdr, endianness))
    }


    /// Write the header in little endian byte order.
    pub fn to_writer<W: Write>(&self, output: W) -> Result<()> {
        let mut output = ByteOrdered::le(output);

        for b in fixed_length_bytes(&self.id_string, 6) { output.write_u8(b)?; }
        for v in self.dim.iter() { output.write_i16(*v)?; }
        for v in self.voxel_size.iter() { output.write_f32(*v)?; }
        for v in self.origin.iter() { output.write_f32(*v)?; }
        output.write_i16(self.n_scalars)?;
        for b in name_slot_bytes(&self.scalar_names) { output.write_u8(b)?; }
        output.write_i16(self.n_properties)?;
        for b in name_slot_bytes(&self.property_names) { output.write_u8(b)?; }
        for row in self.vox_to_ras.iter() {
            for v in row.iter() { output.write_f32(*v)?; }
        }
        for _ in 0..444 { output.write_u8(0)?; }
        for b in fixed_length_bytes(&self.voxel_order, 4) { output.write_u8(b)?; }
        for _ in 0..4 { output.write_u8(0)?; }
        for v in self.image_orientation_patient.iter() { output.write_f32(*v)?; }
        for _ in 0..2 { output.write_u8(0)?; }
        for v in self.invert.iter().chain(self.swap.iter()) { output.write_u8(*v)?; }
        output.write_i32(self.n_count)?;
        output.write_i32(self.version)?;
        output.write_i32(TRK_HEADER_SIZE as i32)?;
        Ok(())
    }
}


/// The byte order is whichever one reads `hdr_size` as 1000.
fn detect_endianness(raw: &[u8; TRK_HEADER_SIZE]) -> Result<Endianness> {
    let mut field = [0u8; 4];
    field.copy_from_slice(&raw[HDR_SIZE_OFFSET..HDR_SIZE_OFFSET + 4]);
    if i32::from_le_bytes(field) == TRK_HEADER_SIZE as i32 {
        Ok(Endianness::Little)
    } else if i32::from_be_bytes(field) == TRK_HEADER_SIZE as i32 {
        Ok(Endianness::Big)
    } else {
        Err(TractmapError::InvalidTrkFormat(format!(
            "hdr_size is {} in neither byte order", i32::from_le_bytes(field))))
    }
}


fn read_name_slots<S: Read>(input: &mut S) -> Result<Vec<String>> {
    let mut names = Vec::with_capacity(TRK_NAME_SLOTS);
    for _ in 0..TRK_NAME_SLOTS {
        names.push(read_fixed_length_string(input, TRK_NAME_LEN)?);
    }
    Ok(names)
}


fn name_slot_bytes(names: &[String]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(TRK_NAME_SLOTS * TRK_NAME_LEN);
    for idx in 0..TRK_NAME_SLOTS {
        let name = names.get(idx).map(String::as_str).unwrap_or("");
        bytes.extend(fixed_length_bytes(name, TRK_NAME_LEN));
    }
    bytes
}


/// Models a TrackVis trk file.
#[derive(Debug, Clone, PartialEq)]
pub struct Trk {
    pub header: TrkHeader,
    pub streamlines: Vec<Streamline>,
    pub scalars: Vec<Vec<f32>>,    // Per track: n_points * n_scalars values, point-major.
    pub properties: Vec<Vec<f32>>, // Per track: n_properties values.
}


impl Trk {

    /// Build a trk without scalars or properties from streamlines.
    pub fn from_streamlines(mut header: TrkHeader, streamlines: Vec<Streamline>) -> Trk {
        header.n_scalars = 0;
        header.n_properties = 0;
        header.n_count = streamlines.len() as i32;
        let scalars = vec![Vec::new(); streamlines.len()];
        let properties = vec![Vec::new(); streamlines.len()];
        Trk { header, streamlines, scalars, properties }
    }

    /// Read a trk file.
    /// If the file's name ends with ".gz", the file is assumed to need GZip decoding.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Trk> {
        let path = path.as_ref();
        let read = || -> Result<Trk> {
            let file = BufReader::new(File::open(path)?);
            if is_gz_file(path) {
                Trk::from_reader(GzDecoder::new(file))
            } else {
                Trk::from_reader(file)
            }
        };
        in_file(path, read())
    }


    /// Read a trk file from the given byte stream, which must be at the start of the header.
    pub fn from_reader<S>(mut input: S) -> Result<Trk>
    where
        S: Read,
    {
        let (hdr, endianness) = TrkHeader::from_reader(&mut input)?;
        let mut input = ByteOrdered::runtime(input, endianness);

        let n_scalars = hdr.n_scalars as usize;
        let n_properties = hdr.n_properties as usize;
        let expected = if hdr.n_count > 0 { Some(hdr.n_count as usize) } else { None };

        let capacity = expected.unwrap_or(0).min(MAX_PREALLOC);
        let mut streamlines: Vec<Streamline> = Vec::with_capacity(capacity);
        let mut scalars: Vec<Vec<f32>> = Vec::with_capacity(capacity);
        let mut properties: Vec<Vec<f32>> = Vec::with_capacity(capacity);

        loop {
            if let Some(n) = expected {
                if streamlines.len() == n {
                    break;
                }
            }

            let n_points = match input.read_i32() {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::UnexpectedEof && expected.is_none() => break,
                Err(e) => return Err(e.into()),
            };
            if n_points < 0 {
                return Err(TractmapError::InvalidTrkFormat(format!(
                    "track {} has negative point count {}", streamlines.len(), n_points)));
            }

            let capacity = (n_points as usize).min(MAX_PREALLOC);
            let mut points = Vec::with_capacity(capacity);
            let mut track_scalars = Vec::with_capacity(capacity * n_scalars);
            for _ in 0..n_points {
                let x = input.read_f32()?;
                let y = input.read_f32()?;
                let z = input.read_f32()?;
                points.push([x, y, z]);
                for _ in 0..n_scalars {
                    track_scalars.push(input.read_f32()?);
                }
            }

            let mut track_properties = Vec::with_capacity(n_properties);
            for _ in 0..n_properties {
                track_properties.push(input.read_f32()?);
            }

            streamlines.push(Streamline::new(points));
            scalars.push(track_scalars);
            properties.push(track_properties);
        }

        Ok(Trk { header: hdr, streamlines, scalars, properties })
    }


    /// Write the trk in little endian byte order.
    pub fn to_writer<W: Write>(&self, output: W) -> Result<()> {
        let mut output = BufWriter::new(output);
        let mut header = self.header.clone();
        header.n_count = self.streamlines.len() as i32;
        header.to_writer(&mut output)?;

        let mut output = ByteOrdered::le(output);
        for (idx, streamline) in self.streamlines.iter().enumerate() {
            let track_scalars = self.scalars.get(idx).map(Vec::as_slice).unwrap_or(&[]);
            let track_properties = self.properties.get(idx).map(Vec::as_slice).unwrap_or(&[]);
            let n_scalars = header.n_scalars.max(0) as usize;
            if track_scalars.len() != streamline.len() * n_scalars || track_properties.len() != header.n_properties.max(0) as usize {
                return Err(TractmapError::InvalidTrkFormat(format!(
                    "track {} does not carry {} scalars per point and {} properties", idx, n_scalars, header.n_properties)));
            }

            output.write_i32(streamline.len() as i32)?;
            for (p_idx, point) in streamline.points.iter().enumerate() {
                for v in point.iter() { output.write_f32(*v)?; }
                for v in &track_scalars[p_idx * n_scalars..(p_idx + 1) * n_scalars] {
                    output.write_f32(*v)?;
                }
            }
            for v in track_properties { output.write_f32(*v)?; }
        }
        output.into_inner().flush()?;
        Ok(())
    }


    /// Write the trk to a file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.to_writer(File::create(path)?)
    }
}


/// Read a TrackVis trk file.
///
/// # Examples
///
/// ```no_run
/// let trk = tractmap::read_trk("/path/to/subject/clustered_whole_brain.trk").unwrap();
/// println!("Read {} streamlines.", trk.streamlines.len());
/// ```
pub fn read_trk<P: AsRef<Path>>(path: P) -> Result<Trk> {
    Trk::from_file(path)
}


/// Write a TrackVis trk file.
pub fn write_trk<P: AsRef<Path>>(path: P, trk: &Trk) -> Result<()> {
    trk.to_file(path)
}
