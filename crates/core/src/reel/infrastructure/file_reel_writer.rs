use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::package::domain::composition::{
    AssetEntry, AssetKind, ManifestReel, ReferencedReelAsset,
};
use crate::package::infrastructure::digest::{file_digest, hex_sha1};
use crate::reel::domain::audio_buffers::AudioBuffers;
use crate::reel::domain::frame_info::FrameInfo;
use crate::reel::domain::player_subtitles::{Font, PlayerSubtitles};
use crate::reel::domain::reel_writer::{ReelWriter, ReelWriterError, ReelWriterFactory};
use crate::shared::constants::SOUND_BYTES_PER_SAMPLE;
use crate::shared::dcp_time::{DcpTime, DcpTimePeriod};
use crate::shared::encoded_data::EncodedData;
use crate::shared::eyes::Eyes;
use crate::shared::film::Film;
use crate::shared::xml_document::XmlDocument;

/// Interop subtitle timing unit: ticks per second.
const SUBTITLE_TICKS: i64 = 250;

/// The last frame committed for one eye, kept so it can be repeated.
enum LastWritten {
    Data(EncodedData),
    OnDisk { offset: u64, size: u64 },
}

struct SoundAsset {
    id: Uuid,
    file_name: PathBuf,
    writer: Option<BufWriter<File>>,
}

/// Writes one reel as plain files.
///
/// The picture asset is the concatenation of the reel's encoded frames and
/// lives in the film's working directory, so a later run can reuse frames
/// already written (fake writes). A frame-info file beside it records the
/// offset, size and hash of every frame. Sound and subtitles go straight to
/// the package directory.
pub struct FileReelWriter {
    film: Film,
    period: DcpTimePeriod,
    index: usize,
    picture_path: PathBuf,
    info_path: PathBuf,
    picture: Option<File>,
    info: Option<File>,
    /// Next write offset in the picture asset.
    position: u64,
    /// Picture asset length before this run started writing.
    existing_len: u64,
    first_nonexistent_frame: i64,
    last_written_frame: Option<i64>,
    last_written_eyes: Eyes,
    last_written: [Option<LastWritten>; 2],
    picture_units: i64,
    picture_asset_id: Uuid,
    picture_file_name: Option<PathBuf>,
    sound: Option<SoundAsset>,
    total_written_audio_frames: i64,
    subtitles: Vec<PlayerSubtitles>,
}

impl FileReelWriter {
    pub fn new(film: Film, period: DcpTimePeriod, index: usize) -> Self {
        let picture_path = film.video_asset_path(&period);
        let info_path = film.info_file(&period);
        Self {
            film,
            period,
            index,
            picture_path,
            info_path,
            picture: None,
            info: None,
            position: 0,
            existing_len: 0,
            first_nonexistent_frame: 0,
            last_written_frame: None,
            last_written_eyes: Eyes::Right,
            last_written: [None, None],
            picture_units: 0,
            picture_asset_id: Uuid::new_v4(),
            picture_file_name: None,
            sound: None,
            total_written_audio_frames: 0,
            subtitles: Vec::new(),
        }
    }

    /// Reel start as a frame index within the whole program.
    pub fn start_frame(&self) -> i64 {
        self.period.from.frames_floor(self.film.video_frame_rate)
    }

    fn info_index(&self, frame: i64, eyes: Eyes) -> u64 {
        if self.film.three_d {
            (frame * 2 + i64::from(eyes == Eyes::Right)) as u64
        } else {
            frame as u64
        }
    }

    fn eye_slot(eyes: Eyes) -> usize {
        usize::from(eyes == Eyes::Right)
    }

    fn reel_eyes(&self) -> &'static [Eyes] {
        if self.film.three_d {
            &[Eyes::Left, Eyes::Right]
        } else {
            &[Eyes::Both]
        }
    }

    fn duration_in_frames(&self) -> i64 {
        self.period.duration().frames_round(self.film.video_frame_rate)
    }

    /// Counts the leading frames of an earlier run that are still intact on disk.
    fn check_existing_picture(&self) -> i64 {
        let (Ok(mut info), Ok(mut picture)) =
            (File::open(&self.info_path), File::open(&self.picture_path))
        else {
            return 0;
        };

        let mut expected_offset = 0;
        for frame in 0..self.duration_in_frames() {
            for &eyes in self.reel_eyes() {
                let Some(record) = read_record(&mut info, self.info_index(frame, eyes)) else {
                    return frame;
                };
                if record.offset != expected_offset
                    || record.offset + record.size > self.existing_len
                {
                    return frame;
                }
                match read_range(&mut picture, record.offset, record.size) {
                    Ok(bytes) if hex_sha1(&bytes) == record.hash => {}
                    _ => return frame,
                }
                expected_offset += record.size;
            }
        }
        self.duration_in_frames()
    }

    fn write_frame_info(
        &mut self,
        frame: i64,
        eyes: Eyes,
        info: &FrameInfo,
    ) -> Result<(), ReelWriterError> {
        let position = self.info_index(frame, eyes) * FrameInfo::RECORD_SIZE as u64;
        let file = self.info.as_mut().ok_or(ReelWriterError::NotStarted)?;
        file.seek(SeekFrom::Start(position))
            .and_then(|_| file.write_all(&info.to_record()))
            .map_err(ReelWriterError::io(&self.info_path))
    }

    fn read_picture(&mut self, offset: u64, size: u64) -> Result<Vec<u8>, ReelWriterError> {
        let file = self.picture.as_mut().ok_or(ReelWriterError::NotStarted)?;
        read_range(file, offset, size).map_err(ReelWriterError::io(&self.picture_path))
    }

    fn record_written(&mut self, frame: i64, eyes: Eyes, last: LastWritten) {
        self.last_written[Self::eye_slot(eyes)] = Some(last);
        self.last_written_frame = Some(frame);
        self.last_written_eyes = eyes;
        self.picture_units += 1;
    }

    fn own_picture_entry(&self) -> Option<AssetEntry> {
        let file = self.picture_file_name.clone()?;
        let frames = if self.film.three_d {
            self.picture_units / 2
        } else {
            self.picture_units
        };
        Some(AssetEntry {
            id: self.picture_asset_id,
            kind: AssetKind::Picture {
                stereoscopic: self.film.three_d,
            },
            file: Some(file),
            edit_rate: self.film.video_frame_rate,
            intrinsic_duration: frames,
            entry_point: 0,
            duration: frames,
            hash: None,
            size: 0,
        })
    }

    fn own_sound_entry(&self) -> Option<AssetEntry> {
        let sound = self.sound.as_ref()?;
        Some(AssetEntry {
            id: sound.id,
            kind: AssetKind::Sound {
                channels: self.film.audio_channels,
                sample_rate: self.film.audio_frame_rate,
            },
            file: Some(sound.file_name.clone()),
            edit_rate: self.film.video_frame_rate,
            intrinsic_duration: self.total_written_audio_frames,
            entry_point: 0,
            duration: self.total_written_audio_frames,
            hash: None,
            size: 0,
        })
    }

    /// Writes the subtitle document and copies its fonts into the package.
    fn write_subtitle_asset(
        &self,
        fonts: &[Font],
    ) -> Result<(AssetEntry, Vec<AssetEntry>), ReelWriterError> {
        let dcp_dir = self.film.dcp_dir();
        let id = Uuid::new_v4();
        let mut font_entries = Vec::new();
        let mut font_uris = Vec::new();

        for font in fonts {
            let Some(source) = &font.file else { continue };
            let Some(name) = source.file_name() else { continue };
            let dest = dcp_dir.join(name);
            if !dest.exists() {
                fs::copy(source, &dest).map_err(ReelWriterError::io(&dest))?;
            }
            font_uris.push((font.id.clone(), name.to_string_lossy().into_owned()));
            font_entries.push(AssetEntry {
                id: Uuid::new_v4(),
                kind: AssetKind::Font,
                file: Some(PathBuf::from(name)),
                edit_rate: self.film.video_frame_rate,
                intrinsic_duration: 0,
                entry_point: 0,
                duration: 0,
                hash: None,
                size: 0,
            });
        }

        let mut doc = XmlDocument::new()?;
        doc.start("DCSubtitle", &[("Version", "1.0")])?;
        doc.text_element("SubtitleID", &id.to_string())?;
        doc.text_element("MovieTitle", &self.film.name)?;
        doc.text_element("ReelNumber", &(self.index + 1).to_string())?;
        doc.text_element("Language", "en")?;
        for (font_id, uri) in &font_uris {
            doc.empty("LoadFont", &[("Id", font_id.as_str()), ("URI", uri.as_str())])?;
        }
        for (spot, subs) in self.subtitles.iter().enumerate() {
            let time_in = subtitle_time(subs.from - self.period.from);
            let time_out = subtitle_time(subs.to - self.period.from);
            let spot = (spot + 1).to_string();
            doc.start(
                "Subtitle",
                &[
                    ("SpotNumber", spot.as_str()),
                    ("TimeIn", time_in.as_str()),
                    ("TimeOut", time_out.as_str()),
                ],
            )?;
            for line in &subs.text {
                let v_position = format!("{:.1}", line.v_position * 100.0);
                let italic = if line.italic { "yes" } else { "no" };
                let font = line.font.as_deref().unwrap_or("");
                doc.start("Font", &[("Id", font), ("Italic", italic)])?;
                doc.text_element_with("Text", &[("VPosition", v_position.as_str())], &line.text)?;
                doc.end("Font")?;
            }
            doc.end("Subtitle")?;
        }
        doc.end("DCSubtitle")?;

        let file_name = PathBuf::from(format!("sub_{id}.xml"));
        let path = dcp_dir.join(&file_name);
        fs::write(&path, doc.into_bytes()).map_err(ReelWriterError::io(&path))?;

        let duration = self.duration_in_frames();
        let entry = AssetEntry {
            id,
            kind: AssetKind::Subtitle,
            file: Some(file_name),
            edit_rate: self.film.video_frame_rate,
            intrinsic_duration: duration,
            entry_point: 0,
            duration,
            hash: None,
            size: 0,
        };
        Ok((entry, font_entries))
    }
}

impl ReelWriter for FileReelWriter {
    fn period(&self) -> DcpTimePeriod {
        self.period
    }

    fn start(&mut self) -> Result<(), ReelWriterError> {
        for path in [&self.picture_path, &self.info_path] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(ReelWriterError::io(parent))?;
            }
        }
        let dcp_dir = self.film.dcp_dir();
        fs::create_dir_all(&dcp_dir).map_err(ReelWriterError::io(&dcp_dir))?;

        self.existing_len = fs::metadata(&self.picture_path).map_or(0, |m| m.len());
        self.first_nonexistent_frame = self.check_existing_picture();
        if self.first_nonexistent_frame > 0 {
            log::info!(
                "Reel {}: {} frames already on disk",
                self.index,
                self.first_nonexistent_frame
            );
        }

        self.picture = Some(open_rw(&self.picture_path)?);
        self.info = Some(open_rw(&self.info_path)?);

        if self.film.audio_channels > 0 {
            let id = Uuid::new_v4();
            let file_name = PathBuf::from(format!("pcm_{id}.mxf"));
            let path = dcp_dir.join(&file_name);
            let file = File::create(&path).map_err(ReelWriterError::io(&path))?;
            self.sound = Some(SoundAsset {
                id,
                file_name,
                writer: Some(BufWriter::new(file)),
            });
        }
        Ok(())
    }

    fn write(&mut self, data: &EncodedData, frame: i64, eyes: Eyes) -> Result<(), ReelWriterError> {
        let position = self.position;
        if frame < self.first_nonexistent_frame {
            let layout_kept = self.read_frame_info(frame, eyes).ok().is_some_and(|old| {
                old.offset == position && old.size == data.len() as u64
            });
            if !layout_kept {
                // Later frames of the earlier run are now shifted or overwritten.
                log::debug!(
                    "Reel {}: frame {frame} ({eyes}) rewritten at a new size; no reuse past it",
                    self.index
                );
                self.first_nonexistent_frame = frame;
            }
        }
        let file = self.picture.as_mut().ok_or(ReelWriterError::NotStarted)?;
        file.seek(SeekFrom::Start(position))
            .and_then(|_| file.write_all(data.data()))
            .map_err(ReelWriterError::io(&self.picture_path))?;

        let info = FrameInfo {
            offset: position,
            size: data.len() as u64,
            hash: hex_sha1(data.data()),
        };
        self.write_frame_info(frame, eyes, &info)?;
        self.position += info.size;
        self.record_written(frame, eyes, LastWritten::Data(data.clone()));
        Ok(())
    }

    fn fake_write(&mut self, frame: i64, eyes: Eyes, size: u64) -> Result<(), ReelWriterError> {
        let offset = self.position;
        if offset + size > self.existing_len {
            return Err(ReelWriterError::FakeDataMissing {
                frame,
                offset,
                needed: size,
                available: self.existing_len.saturating_sub(offset),
            });
        }

        let stale = || ReelWriterError::FakeDataStale {
            frame,
            eyes,
            offset,
        };
        if frame >= self.first_nonexistent_frame {
            return Err(stale());
        }
        let info = self
            .read_frame_info(frame, eyes)
            .ok()
            .filter(|info| info.offset == offset && info.size == size)
            .ok_or_else(stale)?;
        if hex_sha1(&self.read_picture(offset, size)?) != info.hash {
            return Err(stale());
        }
        self.position += size;
        self.record_written(frame, eyes, LastWritten::OnDisk { offset, size });
        Ok(())
    }

    fn repeat_write(&mut self, frame: i64, eyes: Eyes) -> Result<(), ReelWriterError> {
        let data = match &self.last_written[Self::eye_slot(eyes)] {
            Some(LastWritten::Data(data)) => data.clone(),
            Some(LastWritten::OnDisk { offset, size }) => {
                let (offset, size) = (*offset, *size);
                EncodedData::new(self.read_picture(offset, size)?)
            }
            None => return Err(ReelWriterError::NothingToRepeat { frame, eyes }),
        };
        self.write(&data, frame, eyes)
    }

    fn write_audio(&mut self, audio: Option<&AudioBuffers>) -> Result<(), ReelWriterError> {
        let channels = self.film.audio_channels;
        let samples_per_frame =
            (self.film.audio_frame_rate / self.film.video_frame_rate.max(1)) as usize;
        let dcp_dir = self.film.dcp_dir();

        if let Some(SoundAsset {
            file_name,
            writer: Some(writer),
            ..
        }) = &mut self.sound
        {
            let pcm = match audio {
                Some(buffers) => buffers.to_pcm24(channels),
                None => vec![0u8; samples_per_frame * channels * SOUND_BYTES_PER_SAMPLE],
            };
            writer
                .write_all(&pcm)
                .map_err(ReelWriterError::io(dcp_dir.join(&*file_name)))?;
        }
        self.total_written_audio_frames += 1;
        Ok(())
    }

    fn write_subtitles(&mut self, subs: &PlayerSubtitles) -> Result<(), ReelWriterError> {
        self.subtitles.push(subs.clone());
        Ok(())
    }

    fn last_written_frame(&self) -> Option<i64> {
        self.last_written_frame
    }

    fn last_written_eyes(&self) -> Eyes {
        self.last_written_eyes
    }

    fn total_written_audio_frames(&self) -> i64 {
        self.total_written_audio_frames
    }

    fn first_nonexistent_frame(&self) -> i64 {
        self.first_nonexistent_frame
    }

    fn read_frame_info(&self, frame: i64, eyes: Eyes) -> Result<FrameInfo, ReelWriterError> {
        let mut file = File::open(&self.info_path).map_err(ReelWriterError::io(&self.info_path))?;
        read_record(&mut file, self.info_index(frame, eyes))
            .ok_or(ReelWriterError::MissingFrameInfo { frame, eyes })
    }

    fn finish(&mut self) -> Result<(), ReelWriterError> {
        if let Some(picture) = self.picture.take() {
            picture
                .set_len(self.position)
                .and_then(|_| picture.sync_all())
                .map_err(ReelWriterError::io(&self.picture_path))?;
        }
        if let Some(info) = self.info.take() {
            info.sync_all().map_err(ReelWriterError::io(&self.info_path))?;
        }

        let dcp_dir = self.film.dcp_dir();
        if self.picture_units > 0 {
            let file_name = PathBuf::from(format!("j2c_{}.mxf", self.picture_asset_id));
            let dest = dcp_dir.join(&file_name);
            link_or_copy(&self.picture_path, &dest).map_err(ReelWriterError::io(&dest))?;
            self.picture_file_name = Some(file_name);
        }

        if let Some(sound) = &mut self.sound {
            if let Some(mut writer) = sound.writer.take() {
                writer
                    .flush()
                    .map_err(ReelWriterError::io(dcp_dir.join(&sound.file_name)))?;
            }
        }
        Ok(())
    }

    fn create_manifest_entry(
        &mut self,
        referenced: &[ReferencedReelAsset],
        fonts: &[Font],
    ) -> Result<ManifestReel, ReelWriterError> {
        let period = self.period;
        let find_referenced = |is_kind: fn(&AssetEntry) -> bool| {
            referenced
                .iter()
                .filter(|r| r.period == period)
                .map(|r| &r.asset)
                .find(|a| is_kind(a))
                .cloned()
        };

        let mut reel = ManifestReel::new();
        reel.picture = find_referenced(AssetEntry::is_picture).or_else(|| self.own_picture_entry());
        reel.sound = find_referenced(AssetEntry::is_sound).or_else(|| self.own_sound_entry());
        reel.subtitle = match find_referenced(AssetEntry::is_subtitle) {
            Some(asset) => Some(asset),
            None if !self.subtitles.is_empty() => {
                let (subtitle, font_entries) = self.write_subtitle_asset(fonts)?;
                reel.fonts = font_entries;
                Some(subtitle)
            }
            None => None,
        };
        Ok(reel)
    }

    fn calculate_digests(
        &mut self,
        reel: &mut ManifestReel,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<(), ReelWriterError> {
        let dcp_dir = self.film.dcp_dir();
        for asset in reel.assets_mut() {
            let Some(file) = &asset.file else { continue };
            let path = dcp_dir.join(file);
            let hash = file_digest(&path, progress).map_err(ReelWriterError::io(&path))?;
            asset.size = fs::metadata(&path)
                .map_err(ReelWriterError::io(&path))?
                .len();
            asset.hash = Some(hash);
        }
        Ok(())
    }
}

/// Creates a [`FileReelWriter`] for each reel of a film.
pub struct FileReelWriterFactory {
    film: Film,
}

impl FileReelWriterFactory {
    pub fn new(film: Film) -> Self {
        Self { film }
    }
}

impl ReelWriterFactory for FileReelWriterFactory {
    fn create(
        &self,
        period: DcpTimePeriod,
        index: usize,
    ) -> Result<Box<dyn ReelWriter>, ReelWriterError> {
        Ok(Box::new(FileReelWriter::new(self.film.clone(), period, index)))
    }
}

fn open_rw(path: &Path) -> Result<File, ReelWriterError> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(ReelWriterError::io(path))
}

fn read_record(file: &mut File, index: u64) -> Option<FrameInfo> {
    let mut record = [0u8; FrameInfo::RECORD_SIZE];
    file.seek(SeekFrom::Start(index * FrameInfo::RECORD_SIZE as u64))
        .ok()?;
    file.read_exact(&mut record).ok()?;
    FrameInfo::from_record(&record)
}

fn read_range(file: &mut File, offset: u64, size: u64) -> std::io::Result<Vec<u8>> {
    let mut bytes = vec![0u8; size as usize];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn link_or_copy(source: &Path, dest: &Path) -> std::io::Result<()> {
    if dest.exists() {
        fs::remove_file(dest)?;
    }
    if fs::hard_link(source, dest).is_err() {
        fs::copy(source, dest)?;
    }
    Ok(())
}

/// `HH:MM:SS:TTT` with 250 ticks per second.
fn subtitle_time(t: DcpTime) -> String {
    let ticks = t.get().max(0) * SUBTITLE_TICKS / crate::shared::dcp_time::HZ;
    let seconds = ticks / SUBTITLE_TICKS;
    format!(
        "{:02}:{:02}:{:02}:{:03}",
        seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60,
        ticks % SUBTITLE_TICKS
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::domain::composition::tests::entry;
    use crate::reel::domain::player_subtitles::SubtitleString;
    use crate::shared::film::tests::{film, frames};

    fn film_in(dir: &Path, three_d: bool, audio_channels: usize) -> Film {
        let mut f = film(vec![frames(0, 10)], three_d);
        f.directory = dir.to_path_buf();
        f.audio_channels = audio_channels;
        f
    }

    fn frame_bytes(n: u8, len: usize) -> EncodedData {
        EncodedData::new(vec![n; len])
    }

    fn started(f: &Film) -> FileReelWriter {
        let mut writer = FileReelWriter::new(f.clone(), frames(0, 10), 0);
        writer.start().unwrap();
        writer
    }

    #[test]
    fn test_write_records_frame_info() {
        let dir = tempfile::tempdir().unwrap();
        let f = film_in(dir.path(), false, 0);
        let mut writer = started(&f);

        writer.write(&frame_bytes(1, 100), 0, Eyes::Both).unwrap();
        writer.write(&frame_bytes(2, 50), 1, Eyes::Both).unwrap();

        let info = writer.read_frame_info(1, Eyes::Both).unwrap();
        assert_eq!(info.offset, 100);
        assert_eq!(info.size, 50);
        assert_eq!(info.hash, hex_sha1(&[2u8; 50]));
        assert_eq!(writer.last_written_frame(), Some(1));
        assert_eq!(writer.last_written_eyes(), Eyes::Both);
    }

    #[test]
    fn test_missing_frame_info_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let f = film_in(dir.path(), false, 0);
        let writer = started(&f);
        assert!(matches!(
            writer.read_frame_info(3, Eyes::Both),
            Err(ReelWriterError::MissingFrameInfo { frame: 3, .. })
        ));
    }

    #[test]
    fn test_stereo_records_are_interleaved() {
        let dir = tempfile::tempdir().unwrap();
        let f = film_in(dir.path(), true, 0);
        let mut writer = started(&f);

        writer.write(&frame_bytes(1, 10), 0, Eyes::Left).unwrap();
        writer.write(&frame_bytes(2, 20), 0, Eyes::Right).unwrap();
        writer.write(&frame_bytes(3, 30), 1, Eyes::Left).unwrap();

        assert_eq!(writer.read_frame_info(0, Eyes::Right).unwrap().offset, 10);
        assert_eq!(writer.read_frame_info(1, Eyes::Left).unwrap().offset, 30);
    }

    #[test]
    fn test_repeat_duplicates_last_frame() {
        let dir = tempfile::tempdir().unwrap();
        let f = film_in(dir.path(), false, 0);
        let mut writer = started(&f);

        writer.write(&frame_bytes(9, 16), 0, Eyes::Both).unwrap();
        writer.repeat_write(1, Eyes::Both).unwrap();
        writer.finish().unwrap();

        let bytes = fs::read(f.video_asset_path(&frames(0, 10))).unwrap();
        assert_eq!(bytes, vec![9u8; 32]);
    }

    #[test]
    fn test_repeat_without_previous_frame_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let f = film_in(dir.path(), false, 0);
        let mut writer = started(&f);
        assert!(matches!(
            writer.repeat_write(0, Eyes::Both),
            Err(ReelWriterError::NothingToRepeat { .. })
        ));
    }

    #[test]
    fn test_resume_detects_existing_frames_and_fake_writes_them() {
        let dir = tempfile::tempdir().unwrap();
        let f = film_in(dir.path(), false, 0);

        let mut first = started(&f);
        for i in 0..4u8 {
            first.write(&frame_bytes(i, 8), i as i64, Eyes::Both).unwrap();
        }
        first.finish().unwrap();

        let mut second = started(&f);
        assert_eq!(second.first_nonexistent_frame(), 4);

        second.write(&frame_bytes(0, 8), 0, Eyes::Both).unwrap();
        let size = second.read_frame_info(1, Eyes::Both).unwrap().size;
        second.fake_write(1, Eyes::Both, size).unwrap();
        second.repeat_write(2, Eyes::Both).unwrap();
        second.finish().unwrap();

        let bytes = fs::read(f.video_asset_path(&frames(0, 10))).unwrap();
        assert_eq!(&bytes[..8], &[0u8; 8]);
        assert_eq!(&bytes[8..16], &[1u8; 8]);
        assert_eq!(&bytes[16..24], &[1u8; 8]);
        assert_eq!(bytes.len(), 24);
    }

    #[test]
    fn test_resume_stops_at_corrupted_frame() {
        let dir = tempfile::tempdir().unwrap();
        let f = film_in(dir.path(), false, 0);

        let mut first = started(&f);
        for i in 0..3u8 {
            first.write(&frame_bytes(i, 8), i as i64, Eyes::Both).unwrap();
        }
        first.finish().unwrap();

        let path = f.video_asset_path(&frames(0, 10));
        let mut bytes = fs::read(&path).unwrap();
        bytes[9] = 0xff;
        fs::write(&path, bytes).unwrap();

        let second = started(&f);
        assert_eq!(second.first_nonexistent_frame(), 1);
    }

    #[test]
    fn test_fake_write_without_data_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let f = film_in(dir.path(), false, 0);
        let mut writer = started(&f);
        assert!(matches!(
            writer.fake_write(0, Eyes::Both, 100),
            Err(ReelWriterError::FakeDataMissing { needed: 100, .. })
        ));
    }

    #[test]
    fn test_fake_write_after_resized_rewrite_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let f = film_in(dir.path(), false, 0);

        let mut first = started(&f);
        for i in 0..4u8 {
            first.write(&frame_bytes(i, 8), i as i64, Eyes::Both).unwrap();
        }
        first.finish().unwrap();

        let mut second = started(&f);
        second.write(&frame_bytes(7, 12), 0, Eyes::Both).unwrap();
        assert_eq!(second.first_nonexistent_frame(), 0);
        assert!(matches!(
            second.fake_write(1, Eyes::Both, 8),
            Err(ReelWriterError::FakeDataStale { frame: 1, offset: 12, .. })
        ));
        assert_eq!(second.last_written_frame(), Some(0));
    }

    #[test]
    fn test_same_size_rewrite_keeps_later_frames_reusable() {
        let dir = tempfile::tempdir().unwrap();
        let f = film_in(dir.path(), false, 0);

        let mut first = started(&f);
        for i in 0..3u8 {
            first.write(&frame_bytes(i, 8), i as i64, Eyes::Both).unwrap();
        }
        first.finish().unwrap();

        let mut second = started(&f);
        second.write(&frame_bytes(5, 8), 0, Eyes::Both).unwrap();
        assert_eq!(second.first_nonexistent_frame(), 3);
        second.fake_write(1, Eyes::Both, 8).unwrap();
        assert_eq!(second.read_frame_info(1, Eyes::Both).unwrap().hash, hex_sha1(&[1u8; 8]));
    }

    #[test]
    fn test_fake_write_of_frame_not_on_disk_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let f = film_in(dir.path(), false, 0);

        let mut first = started(&f);
        for i in 0..3u8 {
            first.write(&frame_bytes(i, 8), i as i64, Eyes::Both).unwrap();
        }
        first.finish().unwrap();

        // Leave stray bytes past the last recorded frame.
        let path = f.video_asset_path(&frames(0, 10));
        let mut bytes = fs::read(&path).unwrap();
        bytes.extend_from_slice(&[9u8; 8]);
        fs::write(&path, bytes).unwrap();

        let mut second = started(&f);
        assert_eq!(second.first_nonexistent_frame(), 3);
        for i in 0..3 {
            second.fake_write(i, Eyes::Both, 8).unwrap();
        }
        assert!(matches!(
            second.fake_write(3, Eyes::Both, 8),
            Err(ReelWriterError::FakeDataStale { frame: 3, .. })
        ));
    }

    #[test]
    fn test_audio_counts_video_frames_and_writes_pcm() {
        let dir = tempfile::tempdir().unwrap();
        let f = film_in(dir.path(), false, 2);
        let mut writer = started(&f);

        writer
            .write_audio(Some(&AudioBuffers::silent(2, 2000)))
            .unwrap();
        writer.write_audio(None).unwrap();
        assert_eq!(writer.total_written_audio_frames(), 2);

        writer.finish().unwrap();
        let mut reel = writer.create_manifest_entry(&[], &[]).unwrap();
        let sound = reel.sound.clone().unwrap();
        assert_eq!(sound.intrinsic_duration, 2);

        writer.calculate_digests(&mut reel, &mut |_, _| {}).unwrap();
        // 2 frames x 2000 samples x 2 channels x 3 bytes
        assert_eq!(reel.sound.unwrap().size, 24_000);
    }

    #[test]
    fn test_manifest_entry_links_picture_and_hashes_it() {
        let dir = tempfile::tempdir().unwrap();
        let f = film_in(dir.path(), false, 0);
        let mut writer = started(&f);
        writer.write(&frame_bytes(5, 64), 0, Eyes::Both).unwrap();
        writer.finish().unwrap();

        let mut reel = writer.create_manifest_entry(&[], &[]).unwrap();
        writer.calculate_digests(&mut reel, &mut |_, _| {}).unwrap();

        let picture = reel.picture.unwrap();
        let file = f.dcp_dir().join(picture.file.unwrap());
        assert_eq!(fs::read(&file).unwrap(), vec![5u8; 64]);
        assert_eq!(picture.size, 64);
        assert_eq!(picture.intrinsic_duration, 1);
        assert!(picture.hash.is_some());
        assert!(reel.sound.is_none());
    }

    #[test]
    fn test_referenced_asset_replaces_own_picture() {
        let dir = tempfile::tempdir().unwrap();
        let f = film_in(dir.path(), false, 0);
        let mut writer = started(&f);
        writer.write(&frame_bytes(5, 64), 0, Eyes::Both).unwrap();
        writer.finish().unwrap();

        let external = entry(AssetKind::Picture { stereoscopic: false }, None);
        let other_reel = entry(AssetKind::Picture { stereoscopic: false }, None);
        let referenced = vec![
            ReferencedReelAsset {
                asset: other_reel,
                period: frames(10, 20),
            },
            ReferencedReelAsset {
                asset: external.clone(),
                period: frames(0, 10),
            },
        ];
        let reel = writer.create_manifest_entry(&referenced, &[]).unwrap();
        assert_eq!(reel.picture, Some(external));
    }

    #[test]
    fn test_subtitles_written_with_fonts() {
        let dir = tempfile::tempdir().unwrap();
        let f = film_in(dir.path(), false, 0);
        let font_path = dir.path().join("Sans.ttf");
        fs::write(&font_path, b"font").unwrap();

        let mut writer = started(&f);
        writer
            .write_subtitles(&PlayerSubtitles::new(
                DcpTime::from_seconds(1.0),
                DcpTime::from_seconds(2.5),
                vec![SubtitleString::new("Hello <world>", 0.85)],
            ))
            .unwrap();
        writer.finish().unwrap();

        let fonts = vec![Font::new("sans", Some(font_path))];
        let reel = writer.create_manifest_entry(&[], &fonts).unwrap();
        let subtitle = reel.subtitle.unwrap();
        let xml = fs::read_to_string(f.dcp_dir().join(subtitle.file.unwrap())).unwrap();

        assert!(xml.contains("TimeIn=\"00:00:01:000\""));
        assert!(xml.contains("TimeOut=\"00:00:02:125\""));
        assert!(xml.contains("Hello &lt;world&gt;"));
        assert!(xml.contains("<LoadFont Id=\"sans\" URI=\"Sans.ttf\"/>"));
        assert_eq!(reel.fonts.len(), 1);
        assert!(f.dcp_dir().join("Sans.ttf").exists());
    }

    #[test]
    fn test_subtitle_time_format() {
        assert_eq!(subtitle_time(DcpTime::from_seconds(3725.5)), "01:02:05:125");
    }

    #[test]
    fn test_factory_builds_writer_for_period() {
        let dir = tempfile::tempdir().unwrap();
        let f = film_in(dir.path(), false, 0);
        let factory = FileReelWriterFactory::new(f);
        let writer = factory.create(frames(10, 20), 1).unwrap();
        assert_eq!(writer.period(), frames(10, 20));
    }
}
