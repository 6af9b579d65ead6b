//! Resumable detection and decoding of PROXY protocol headers.
//!
//! The decoder is called with everything buffered so far each time more bytes arrive. A
//! [`DecodeProgress`] remembers what has already been validated, so the fixed part of a binary
//! header is checked once and the search for the end of a text line never rescans bytes.

use nom::branch::alt;
use nom::bytes::streaming::tag;
use nom::combinator::value;
use nom::{IResult, Needed};

use crate::error::{DecodeError, ErrorKind};
use crate::model::{Envelope, Version};
use crate::{v1, v2};

/// The outcome of a decode attempt.
#[derive(Debug, PartialEq)]
pub enum Decision {
    /// The header is incomplete; at least this many more bytes are required.
    NeedMoreData(usize),
    /// The header was decoded from the first `usize` bytes of the buffer.
    Decoded(Envelope, usize),
    /// The buffer cannot begin with a valid header.
    Rejected(DecodeError),
}

impl Decision {
    /// Tests whether more bytes could change this decision.
    pub fn is_final(&self) -> bool {
        !matches!(self, Decision::NeedMoreData(..))
    }

    /// The category of a rejection.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Decision::Rejected(error) => Some(error.kind()),
            _ => None,
        }
    }
}

/// The part of a header the decoder is waiting on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Signature,
    TextLine,
    FixedHeader,
    AddressBlock,
    Tlvs,
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Stage {
    Signature,
    Text { scanned: usize },
    Binary(Option<v2::Header>),
}

/// A cursor over a growing buffer that survives between decode attempts.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DecodeProgress {
    stage: Stage,
    offset: usize,
}

impl Default for DecodeProgress {
    fn default() -> Self {
        DecodeProgress::new()
    }
}

fn signature(input: &[u8]) -> IResult<&[u8], Version> {
    alt((
        value(Version::Two, tag(v2::PROTOCOL_PREFIX)),
        value(Version::One, tag(v1::PREFIX)),
    ))(input)
}

impl DecodeProgress {
    pub fn new() -> Self {
        DecodeProgress {
            stage: Stage::Signature,
            offset: 0,
        }
    }

    /// The number of buffered bytes seen by the last attempt.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn phase(&self) -> Phase {
        match self.stage {
            Stage::Signature => Phase::Signature,
            Stage::Text { .. } => Phase::TextLine,
            Stage::Binary(None) => Phase::FixedHeader,
            Stage::Binary(Some(header)) if self.offset < header.tlvs_start() => {
                Phase::AddressBlock
            }
            Stage::Binary(Some(..)) => Phase::Tlvs,
        }
    }

    /// Attempts to decode a header from the start of `buffer`.
    ///
    /// `buffer` must hold every byte passed to previous attempts, in order. Progress is reset
    /// after a final decision.
    pub fn attempt(&mut self, buffer: &[u8]) -> Decision {
        let decision = self.step(buffer);

        if decision.is_final() {
            self.reset();
        }

        decision
    }

    /// Makes a final decision once no more bytes will arrive.
    /// An incomplete header is rejected as truncated.
    pub fn finish(&mut self, buffer: &[u8]) -> Decision {
        let decision = match self.step(buffer) {
            Decision::NeedMoreData(..) => {
                Decision::Rejected(DecodeError::Truncated(buffer.len()))
            }
            decision => decision,
        };

        self.reset();
        decision
    }

    pub fn reset(&mut self) {
        *self = DecodeProgress::new();
    }

    fn step(&mut self, buffer: &[u8]) -> Decision {
        self.offset = buffer.len();

        loop {
            match self.stage {
                Stage::Signature => match signature(buffer) {
                    Ok((_, Version::Two)) => self.stage = Stage::Binary(None),
                    Ok((_, Version::One)) => self.stage = Stage::Text { scanned: 0 },
                    Err(nom::Err::Incomplete(Needed::Size(size))) => {
                        return Decision::NeedMoreData(size.get())
                    }
                    Err(nom::Err::Incomplete(Needed::Unknown)) => {
                        return Decision::NeedMoreData(1)
                    }
                    Err(_) => return Decision::Rejected(DecodeError::Signature),
                },
                Stage::Text { scanned } => {
                    return match v1::header_length(buffer, scanned) {
                        Ok(length) => match v1::parse_line(buffer, length) {
                            Ok(header) => Decision::Decoded(header.into(), length),
                            Err(error) => Decision::Rejected(error.into()),
                        },
                        Err(v1::ParseError::MissingNewLine) => {
                            self.stage = Stage::Text {
                                scanned: buffer.len(),
                            };
                            Decision::NeedMoreData(1)
                        }
                        Err(error) => Decision::Rejected(error.into()),
                    };
                }
                Stage::Binary(None) => match v2::Header::try_from(buffer) {
                    Ok(header) => self.stage = Stage::Binary(Some(header)),
                    Err(v2::ParseError::Incomplete(needed)) => {
                        return Decision::NeedMoreData(needed)
                    }
                    Err(error) => return Decision::Rejected(error.into()),
                },
                Stage::Binary(Some(header)) => {
                    if buffer.len() < header.len() {
                        return Decision::NeedMoreData(header.len() - buffer.len());
                    }

                    return match v2::parse_body(&buffer[..header.len()], &header) {
                        Ok(envelope) => Decision::Decoded(envelope, header.len()),
                        Err(error) => Decision::Rejected(error.into()),
                    };
                }
            }
        }
    }
}

/// Attempts to decode a header from the start of `buffer`, resuming from `progress`.
pub fn attempt(buffer: &[u8], progress: &mut DecodeProgress) -> Decision {
    progress.attempt(buffer)
}
