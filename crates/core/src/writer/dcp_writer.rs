use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Instant;

use crate::package::domain::certificate_chain::CertificateChain;
use crate::package::domain::composition::{CompositionPlaylist, ReferencedReelAsset};
use crate::package::domain::package_writer::PackageWriter;
use crate::reel::domain::audio_buffers::AudioBuffers;
use crate::reel::domain::frame_info::FrameInfo;
use crate::reel::domain::player_subtitles::{Font, PlayerSubtitles};
use crate::reel::domain::reel_writer::{ReelWriter, ReelWriterFactory};
use crate::shared::config::DcpConfig;
use crate::shared::constants::{FRAMES_IN_MEMORY_PER_THREAD, JOB_DIGESTS, JOB_ENCODING};
use crate::shared::dcp_time::{DcpTime, DcpTimePeriod};
use crate::shared::encoded_data::EncodedData;
use crate::shared::eyes::Eyes;
use crate::shared::film::Film;
use crate::writer::frame_queue::{FrameQueue, ReelCursor};
use crate::writer::job_reporter::{JobReporter, NullJobReporter};
use crate::writer::queue_item::{Payload, QueueItem, QueueKind};
use crate::writer::writer_error::WriterError;

/// Name of the metric reported with the number of full frames held in memory.
pub const FRAMES_IN_MEMORY_METRIC: &str = "frames_in_memory";

/// What a finished writer produced.
#[derive(Debug)]
pub struct PackageSummary {
    pub full_written: u64,
    pub fake_written: u64,
    pub repeat_written: u64,
    pub pushed_to_disk: u64,
    /// Units still queued at finish because an earlier unit never arrived.
    pub dropped: Vec<QueueItem>,
    pub cpl_path: PathBuf,
}

fn ceiling_for(threads: usize) -> usize {
    (threads as f64 * FRAMES_IN_MEMORY_PER_THREAD).round() as usize
}

struct WriterState {
    queue: FrameQueue,
    cursors: Vec<ReelCursor>,
    full_written: u64,
    fake_written: u64,
    repeat_written: u64,
    pushed_to_disk: u64,
    /// Full frames in the queue whose bytes are still in memory.
    queued_full_in_memory: usize,
    maximum_frames_in_memory: usize,
    finish: bool,
    stopped: bool,
    dropped: Vec<QueueItem>,
    fonts: Vec<Font>,
    referenced_assets: Vec<ReferencedReelAsset>,
    reporter: Box<dyn JobReporter>,
}

impl WriterState {
    fn over_ceiling(&self) -> bool {
        self.queued_full_in_memory > self.maximum_frames_in_memory
    }

    fn committed(&self) -> u64 {
        self.full_written + self.fake_written + self.repeat_written
    }

    fn report_in_memory(&mut self) {
        let value = self.queued_full_in_memory as f64;
        self.reporter.metric(FRAMES_IN_MEMORY_METRIC, value);
    }
}

/// State shared between the producers and the writer thread.
struct Shared {
    film: Film,
    periods: Vec<DcpTimePeriod>,
    reels: Vec<Mutex<Box<dyn ReelWriter>>>,
    state: Mutex<WriterState>,
    /// Wakes the writer thread: work arrived, finish requested or over the ceiling.
    empty_condition: Condvar,
    /// Wakes producers waiting for room in memory.
    full_condition: Condvar,
    /// Reel that the next block of audio goes to.
    audio_reel: Mutex<usize>,
    /// Reel that the next subtitle goes to.
    subtitle_reel: Mutex<usize>,
}

impl Shared {
    fn lock_state(&self) -> Result<MutexGuard<'_, WriterState>, WriterError> {
        self.state.lock().map_err(|_| WriterError::Poisoned)
    }

    fn lock_reel(&self, reel: usize) -> Result<MutexGuard<'_, Box<dyn ReelWriter>>, WriterError> {
        self.reels[reel].lock().map_err(|_| WriterError::Poisoned)
    }

    /// Reel index and reel-relative frame of a program frame.
    fn locate(&self, frame: i64) -> Result<(usize, i64), WriterError> {
        let rate = self.film.video_frame_rate;
        let t = DcpTime::from_frames(frame, rate);
        self.periods
            .iter()
            .position(|period| period.contains(t))
            .map(|reel| (reel, frame - self.periods[reel].from.frames_floor(rate)))
            .ok_or(WriterError::FrameOutOfRange { frame })
    }

    /// A 2D frame in a 3D film is written once per eye.
    fn split_eyes(&self, eyes: Eyes) -> Vec<Eyes> {
        if self.film.three_d && eyes == Eyes::Both {
            vec![Eyes::Left, Eyes::Right]
        } else {
            vec![eyes]
        }
    }

    /// Blocks while too many full frames are held in memory.
    fn wait_for_space(&self) -> Result<MutexGuard<'_, WriterState>, WriterError> {
        let mut state = self.lock_state()?;
        while !state.stopped && state.over_ceiling() {
            log::trace!(
                "Producer waits with {} frames in memory",
                state.queued_full_in_memory
            );
            state = self
                .full_condition
                .wait(state)
                .map_err(|_| WriterError::Poisoned)?;
        }
        if state.stopped {
            return Err(WriterError::ThreadStopped);
        }
        Ok(state)
    }

    fn enqueue(
        &self,
        frame: i64,
        eyes: Eyes,
        kind: impl Fn(Eyes) -> QueueKind,
    ) -> Result<(), WriterError> {
        let (reel, reel_frame) = self.locate(frame)?;
        let mut state = self.wait_for_space()?;
        for eyes in self.split_eyes(eyes) {
            let item = QueueItem::new(kind(eyes), reel, reel_frame, eyes);
            if item.is_in_memory() {
                state.queued_full_in_memory += 1;
            }
            state.queue.push(item);
        }
        state.report_in_memory();
        drop(state);
        self.empty_condition.notify_all();
        Ok(())
    }

    fn run(&self) -> Result<(), WriterError> {
        let _stop = StopOnExit(self);
        let result = self.thread_body();
        if let Err(e) = &result {
            log::error!("Writer thread failed: {e}");
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            self.drop_leftovers(&mut state);
        }
        result
    }

    fn thread_body(&self) -> Result<(), WriterError> {
        let total = {
            let frames = self.film.length_in_frames().max(0) as u64;
            if self.film.three_d {
                frames * 2
            } else {
                frames
            }
        };

        loop {
            let mut state = self.lock_state()?;
            while !(state.finish
                || state.over_ceiling()
                || state.queue.head_is_committable(&state.cursors))
            {
                log::trace!("Writer sleeps with a queue of {}", state.queue.len());
                state = self
                    .empty_condition
                    .wait(state)
                    .map_err(|_| WriterError::Poisoned)?;
                log::trace!("Writer wakes with a queue of {}", state.queue.len());
            }

            if state.finish && !state.queue.head_is_committable(&state.cursors) {
                self.drop_leftovers(&mut state);
                return Ok(());
            }

            loop {
                let item = {
                    let s = &mut *state;
                    s.queue.pop_committable(&s.cursors)
                };
                let Some(item) = item else { break };
                if item.is_in_memory() {
                    state.queued_full_in_memory -= 1;
                }
                drop(state);

                let started = Instant::now();
                self.commit(&item)?;
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

                state = self.lock_state()?;
                match item.kind {
                    QueueKind::Full(_) => state.full_written += 1,
                    QueueKind::Fake { .. } => state.fake_written += 1,
                    QueueKind::Repeat => state.repeat_written += 1,
                }
                state.cursors[item.reel].advance(item.frame, item.eyes);
                let committed = state.committed();
                state.reporter.timing("commit", elapsed_ms);
                state.reporter.progress(committed, total);
                // Committing made room for producers.
                self.full_condition.notify_all();
            }

            while state.over_ceiling() {
                let (key, data) = state
                    .queue
                    .spill_candidate()
                    .ok_or(WriterError::NoSpillCandidate)?;
                drop(state);

                let (reel, frame, eyes) = key;
                let path = self.film.j2c_path(reel, frame, eyes, false);
                let temp = self.film.j2c_path(reel, frame, eyes, true);
                data.write_via_temp(&temp, &path)
                    .map_err(WriterError::spill(&path))?;

                state = self.lock_state()?;
                log::info!(
                    "Writer full; pushes frame {frame} ({eyes}) of reel {reel} to disk"
                );
                if state.queue.mark_spilled(key, path.clone(), data.len() as u64) {
                    state.queued_full_in_memory -= 1;
                    state.pushed_to_disk += 1;
                } else {
                    let _ = fs::remove_file(&path);
                }
            }

            state.report_in_memory();
            drop(state);
            self.full_condition.notify_all();
        }
    }

    /// Writes one unit to its reel. Called without the state lock held.
    fn commit(&self, item: &QueueItem) -> Result<(), WriterError> {
        log::debug!("Writer commits {item}");
        let mut reel = self.lock_reel(item.reel)?;
        let result = match &item.kind {
            QueueKind::Full(Payload::InMemory(data)) => reel.write(data, item.frame, item.eyes),
            QueueKind::Full(Payload::Spilled { path, .. }) => {
                let data = EncodedData::from_file(path).map_err(WriterError::spill(path))?;
                reel.write(&data, item.frame, item.eyes)
            }
            QueueKind::Fake { size } => reel.fake_write(item.frame, item.eyes, *size),
            QueueKind::Repeat => reel.repeat_write(item.frame, item.eyes),
        };
        drop(reel);

        // The spill file goes with its ticket, committed or not.
        if let QueueKind::Full(Payload::Spilled { path, .. }) = &item.kind {
            if let Err(e) = fs::remove_file(path) {
                log::warn!("Could not remove {}: {e}", path.display());
            }
        }
        result.map_err(WriterError::reel(item.reel))
    }

    fn drop_leftovers(&self, state: &mut WriterState) {
        if state.queue.is_empty() {
            return;
        }
        let message = format!(
            "Writer finishing with {} units that cannot be written",
            state.queue.len()
        );
        log::warn!("{message}");
        state.reporter.info(&message);
        for (reel, cursor) in state.cursors.iter().enumerate() {
            log::warn!(
                "  reel {reel}: last written frame {:?} ({})",
                cursor.last_frame,
                cursor.last_eyes
            );
        }
        for item in state.queue.drain() {
            log::warn!("  dropped {item}");
            if let QueueKind::Full(Payload::Spilled { path, .. }) = &item.kind {
                let _ = fs::remove_file(path);
            }
            state.dropped.push(item);
        }
        state.queued_full_in_memory = 0;
    }

    fn request_finish(&self) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.finish = true;
        drop(state);
        self.empty_condition.notify_all();
        self.full_condition.notify_all();
    }
}

/// Marks the writer thread as stopped however it exits, so producers
/// blocked on memory are released.
struct StopOnExit<'a>(&'a Shared);

impl Drop for StopOnExit<'_> {
    fn drop(&mut self) {
        let mut state = match self.0.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.stopped = true;
        drop(state);
        self.0.full_condition.notify_all();
    }
}

/// Collects encoded frames from any number of producer threads, commits
/// them to their reels in order on a dedicated thread, and assembles the
/// finished package.
///
/// Producers call [`write`](Self::write), [`repeat`](Self::repeat) and
/// [`fake_write`](Self::fake_write) in any order from any thread; they
/// block while too many encoded frames are held in memory. Frames the
/// writer cannot commit yet are moved to disk when memory is short.
pub struct Writer {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<Result<(), WriterError>>>,
    started: bool,
    package_writer: Box<dyn PackageWriter>,
    signer: Option<Arc<dyn CertificateChain>>,
    creator: String,
    issuer: String,
}

impl Writer {
    /// Prepares the package directory and opens one reel writer per reel.
    ///
    /// Fails with [`WriterError::InvalidSigner`] before touching the disk if
    /// the film is to be signed and `signer` is missing or not valid.
    pub fn new(
        film: Film,
        config: &DcpConfig,
        factory: &dyn ReelWriterFactory,
        package_writer: Box<dyn PackageWriter>,
        signer: Option<Arc<dyn CertificateChain>>,
        mut reporter: Box<dyn JobReporter>,
    ) -> Result<Self, WriterError> {
        if film.signed && !signer.as_ref().is_some_and(|s| s.valid()) {
            return Err(WriterError::InvalidSigner);
        }

        package_writer.prepare()?;

        let mut reels = Vec::with_capacity(film.reels.len());
        let mut cursors = Vec::with_capacity(film.reels.len());
        for (index, period) in film.reels.iter().enumerate() {
            let mut reel = factory
                .create(*period, index)
                .map_err(WriterError::reel(index))?;
            reel.start().map_err(WriterError::reel(index))?;
            cursors.push(ReelCursor::new(
                reel.last_written_frame(),
                reel.last_written_eyes(),
            ));
            reels.push(Mutex::new(reel));
        }

        reporter.sub(JOB_ENCODING);
        let maximum_frames_in_memory = ceiling_for(config.encoder_threads);
        log::info!(
            "Writer for {} with {} reels, up to {} frames in memory",
            film.name,
            reels.len(),
            maximum_frames_in_memory
        );

        let state = WriterState {
            queue: FrameQueue::new(),
            cursors,
            full_written: 0,
            fake_written: 0,
            repeat_written: 0,
            pushed_to_disk: 0,
            queued_full_in_memory: 0,
            maximum_frames_in_memory,
            finish: false,
            stopped: false,
            dropped: Vec::new(),
            fonts: Vec::new(),
            referenced_assets: Vec::new(),
            reporter,
        };

        Ok(Self {
            shared: Arc::new(Shared {
                periods: film.reels.clone(),
                film,
                reels,
                state: Mutex::new(state),
                empty_condition: Condvar::new(),
                full_condition: Condvar::new(),
                audio_reel: Mutex::new(0),
                subtitle_reel: Mutex::new(0),
            }),
            thread: None,
            started: false,
            package_writer,
            signer,
            creator: config.creator_or_default(),
            issuer: config.issuer_or_default(),
        })
    }

    /// Starts the writer thread.
    pub fn start(&mut self) -> Result<(), WriterError> {
        if self.started {
            return Err(WriterError::AlreadyStarted);
        }
        self.started = true;
        let shared = Arc::clone(&self.shared);
        self.thread = Some(std::thread::spawn(move || shared.run()));
        Ok(())
    }

    pub fn film(&self) -> &Film {
        &self.shared.film
    }

    /// Queues an encoded frame. `frame` counts from the start of the program.
    pub fn write(&self, data: EncodedData, frame: i64, eyes: Eyes) -> Result<(), WriterError> {
        self.shared.enqueue(frame, eyes, |_| {
            QueueKind::Full(Payload::InMemory(data.clone()))
        })
    }

    /// Queues a repeat of the previous frame.
    pub fn repeat(&self, frame: i64, eyes: Eyes) -> Result<(), WriterError> {
        if !self.can_repeat(frame) {
            return Err(WriterError::RepeatNotAllowed { frame });
        }
        self.shared.enqueue(frame, eyes, |_| QueueKind::Repeat)
    }

    /// Queues a frame whose data an earlier run already wrote.
    pub fn fake_write(&self, frame: i64, eyes: Eyes) -> Result<(), WriterError> {
        if !self.can_fake_write(frame) {
            return Err(WriterError::FakeWriteNotAllowed { frame });
        }
        let (reel, reel_frame) = self.shared.locate(frame)?;

        let mut sizes = Vec::new();
        {
            let writer = self.shared.lock_reel(reel)?;
            for eyes in self.shared.split_eyes(eyes) {
                let info = writer
                    .read_frame_info(reel_frame, eyes)
                    .map_err(WriterError::reel(reel))?;
                sizes.push((eyes, info.size));
            }
        }

        self.shared.enqueue(frame, eyes, |eyes| {
            let size = sizes
                .iter()
                .find(|(e, _)| *e == eyes)
                .map_or(0, |(_, size)| *size);
            QueueKind::Fake { size }
        })
    }

    /// False for the first frame of a reel, which has nothing to repeat.
    pub fn can_repeat(&self, frame: i64) -> bool {
        self.shared
            .locate(frame)
            .is_ok_and(|(_, reel_frame)| reel_frame > 0)
    }

    /// True if `frame` is already on disk from an earlier run and is not
    /// the first frame of its reel.
    pub fn can_fake_write(&self, frame: i64) -> bool {
        let Ok((reel, reel_frame)) = self.shared.locate(frame) else {
            return false;
        };
        if reel_frame == 0 {
            return false;
        }
        self.shared
            .lock_reel(reel)
            .is_ok_and(|writer| reel_frame < writer.first_nonexistent_frame())
    }

    /// Offset, size and hash recorded for `frame` by its reel, from this run
    /// or an earlier one.
    pub fn frame_info(&self, frame: i64, eyes: Eyes) -> Result<FrameInfo, WriterError> {
        let (reel, reel_frame) = self.shared.locate(frame)?;
        let writer = self.shared.lock_reel(reel)?;
        writer
            .read_frame_info(reel_frame, eyes)
            .map_err(WriterError::reel(reel))
    }

    /// Writes one video frame's worth of audio, or silence for `None`.
    ///
    /// Blocks go to reels in arrival order; each reel takes as many as it has
    /// video frames. Audio past the last reel is ignored.
    pub fn write_audio(&self, audio: Option<AudioBuffers>) -> Result<(), WriterError> {
        let mut cursor = self
            .shared
            .audio_reel
            .lock()
            .map_err(|_| WriterError::Poisoned)?;
        let reel = *cursor;
        if reel >= self.shared.reels.len() {
            return Ok(());
        }

        let mut writer = self.shared.lock_reel(reel)?;
        writer
            .write_audio(audio.as_ref())
            .map_err(WriterError::reel(reel))?;
        let reel_frames = self.shared.periods[reel]
            .duration()
            .frames_floor(self.shared.film.video_frame_rate);
        if writer.total_written_audio_frames() >= reel_frames {
            *cursor += 1;
        }
        Ok(())
    }

    /// Writes a subtitle event to the reel it starts in. Empty events and
    /// events after the last reel are ignored.
    pub fn write_subtitles(&self, subs: PlayerSubtitles) -> Result<(), WriterError> {
        if subs.is_empty() {
            return Ok(());
        }
        let mut cursor = self
            .shared
            .subtitle_reel
            .lock()
            .map_err(|_| WriterError::Poisoned)?;
        while *cursor < self.shared.periods.len() && self.shared.periods[*cursor].to <= subs.from {
            *cursor += 1;
        }
        let reel = *cursor;
        if reel >= self.shared.reels.len() {
            return Ok(());
        }
        self.shared
            .lock_reel(reel)?
            .write_subtitles(&subs)
            .map_err(WriterError::reel(reel))
    }

    /// Registers fonts used by subtitles, to be packaged at finish.
    pub fn write_fonts(&self, fonts: Vec<Font>) -> Result<(), WriterError> {
        self.shared.lock_state()?.fonts.extend(fonts);
        Ok(())
    }

    /// Uses an asset from an existing package for the reel covering its period.
    pub fn write_referenced_asset(&self, asset: ReferencedReelAsset) -> Result<(), WriterError> {
        self.shared.lock_state()?.referenced_assets.push(asset);
        Ok(())
    }

    pub fn set_encoder_threads(&self, threads: usize) -> Result<(), WriterError> {
        let mut state = self.shared.lock_state()?;
        state.maximum_frames_in_memory = ceiling_for(threads);
        drop(state);
        self.shared.empty_condition.notify_all();
        self.shared.full_condition.notify_all();
        Ok(())
    }

    /// Stops the writer thread once everything committable has been written,
    /// then finishes every reel and writes the composition and its manifests.
    pub fn finish(&mut self) -> Result<PackageSummary, WriterError> {
        let thread = self.thread.take().ok_or(WriterError::NotStarted)?;
        self.shared.request_finish();
        thread.join().map_err(|_| WriterError::ThreadPanicked)??;

        let shared = &self.shared;
        log::info!("Finishing {} reels", shared.reels.len());
        for reel in 0..shared.reels.len() {
            shared
                .lock_reel(reel)?
                .finish()
                .map_err(WriterError::reel(reel))?;
        }

        let (mut reporter, fonts, referenced, summary) = {
            let mut state = shared.lock_state()?;
            let reporter = std::mem::replace(&mut state.reporter, Box::new(NullJobReporter));
            let summary = PackageSummary {
                full_written: state.full_written,
                fake_written: state.fake_written,
                repeat_written: state.repeat_written,
                pushed_to_disk: state.pushed_to_disk,
                dropped: std::mem::take(&mut state.dropped),
                cpl_path: PathBuf::new(),
            };
            (
                reporter,
                state.fonts.clone(),
                state.referenced_assets.clone(),
                summary,
            )
        };

        let film = &shared.film;
        let mut cpl = CompositionPlaylist::new(&film.name, film.content_kind, film.standard);
        cpl.creator = self.creator.clone();
        cpl.issuer = self.issuer.clone();

        reporter.sub(JOB_DIGESTS);
        for reel in 0..shared.reels.len() {
            let mut writer = shared.lock_reel(reel)?;
            let mut entry = writer
                .create_manifest_entry(&referenced, &fonts)
                .map_err(WriterError::reel(reel))?;
            writer
                .calculate_digests(&mut entry, &mut |done, total| {
                    reporter.progress(done, total)
                })
                .map_err(WriterError::reel(reel))?;
            cpl.reels.push(entry);
        }

        let signer = if film.signed {
            match &self.signer {
                Some(signer) if signer.valid() => Some(signer.as_ref()),
                _ => return Err(WriterError::InvalidSigner),
            }
        } else {
            None
        };

        let cpl_path = self.package_writer.write(&cpl, signer)?;

        log::info!(
            "Wrote {} FULL, {} FAKE, {} REPEAT, {} pushed to disk",
            summary.full_written,
            summary.fake_written,
            summary.repeat_written,
            summary.pushed_to_disk
        );
        reporter.summary();

        Ok(PackageSummary {
            cpl_path,
            ..summary
        })
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.shared.request_finish();
            if thread.join().is_err() {
                log::error!("Writer thread panicked");
            }
        }
    }
}
