// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use super::graph::NodeId;

/// Errors raised while decoding an audio file into a sample buffer.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("{path} could not be decoded: {source}")]
    Audio {
        path: String,
        #[source]
        source: symphonia::core::errors::Error,
    },

    #[error("{0} contains no audio track")]
    NoAudioTrack(String),

    #[error("{0} does not specify a sample rate")]
    UnknownSampleRate(String),

    #[error("{0} decoded to zero channels")]
    NoChannels(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors raised by the audio graph when a request cannot be honoured.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),

    #[error("node {0} is not a sample player")]
    NotAPlayer(NodeId),

    #[error("node {0} is not a gain stage")]
    NotAGainStage(NodeId),

    #[error("node {0} has no outputs to connect")]
    NoOutput(NodeId),

    #[error("connecting {0} to {1} would create a cycle")]
    Cycle(NodeId, NodeId),

    #[error("sample player {0} has already been started")]
    AlreadyStarted(NodeId),

    #[error("invalid automation value {value} at {time}s")]
    InvalidAutomation { value: f64, time: f64 },

    #[error("invalid playback rate {0}")]
    InvalidPlaybackRate(f64),
}
