//! Error handling module for AVMerge

use thiserror::Error;

/// Main error type for merge operations
#[derive(Error, Debug)]
pub enum MergeError {
    /// FFmpeg initialization error
    #[error("Failed to initialize FFmpeg: {message}")]
    InitError { message: String },

    /// Source file missing, unreadable, or unparseable
    #[error("Failed to open input file {path}: {message}")]
    InputOpenError { path: String, message: String },

    /// Destination path not writable or format unresolvable from extension
    #[error("Failed to create output file {path}: {message}")]
    OutputCreateError { path: String, message: String },

    /// Output container rejected a new stream slot
    #[error("Failed to create output stream: {message}")]
    StreamCreationError { message: String },

    /// No decoder or encoder could be resolved for a stream
    #[error("Failed to resolve codec: {message}")]
    CodecResolutionError { message: String },

    /// Decoder/encoder parameter negotiation rejected
    #[error("Failed to open codec: {message}")]
    CodecOpenError { message: String },

    /// Output container header could not be written
    #[error("Failed to write output header: {message}")]
    HeaderWriteError { message: String },

    /// Packet write rejected by the output container
    #[error("Failed to write packet: {message}")]
    PacketWriteError { message: String },

    /// Decode or re-encode failure on a transcoded stream
    #[error("Transcoding failed: {message}")]
    TranscodeError { message: String },

    /// Output container trailer could not be written
    #[error("Failed to write output trailer: {message}")]
    TrailerWriteError { message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// FFmpeg error
    #[error("FFmpeg error: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),
}

/// Result type alias for merge operations
pub type MergeResult<T> = std::result::Result<T, MergeError>;
