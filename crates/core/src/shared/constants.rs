/// Sub-job names reported while a package is being produced.
pub const JOB_ENCODING: &str = "Encoding image data";
pub const JOB_DIGESTS: &str = "Computing digests";

/// Producers may run this far ahead of the writer, per encoder thread.
pub const FRAMES_IN_MEMORY_PER_THREAD: f64 = 1.1;

/// Bytes per sample of the sound asset (24-bit PCM).
pub const SOUND_BYTES_PER_SAMPLE: usize = 3;

/// Read size used when hashing asset files.
pub const DIGEST_CHUNK_SIZE: usize = 1024 * 1024;
