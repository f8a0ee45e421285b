pub mod audio_buffers;
pub mod frame_info;
pub mod player_subtitles;
pub mod reel_partition;
pub mod reel_writer;
