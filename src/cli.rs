use std::path::PathBuf;

use crate::error::{AppError, Result};

pub const USAGE: &str = "\
usage:
  audio-steg record --seconds N [--out FILE]
  audio-steg embed <audio> <image> [--n-fft N] [--hop-length N] [--out FILE]
  audio-steg embed --record N <image> [--n-fft N] [--hop-length N] [--out FILE]
  audio-steg extract <image> [--out FILE]
  audio-steg download <file-id> <image|audio> [--out FILE]
  audio-steg health";

/// Откуда брать аудио для embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    File(PathBuf),
    Microphone { seconds: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadKind {
    Image,
    Audio,
}

/// Команда командной строки.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Record {
        seconds: u64,
        out: Option<String>,
    },
    Embed {
        audio: AudioSource,
        image: PathBuf,
        n_fft: Option<u32>,
        hop_length: Option<u32>,
        out: Option<String>,
    },
    Extract {
        image: PathBuf,
        out: Option<String>,
    },
    Download {
        file_id: String,
        kind: DownloadKind,
        out: Option<String>,
    },
    Health,
}

#[derive(Default)]
struct Parsed {
    positional: Vec<String>,
    seconds: Option<u64>,
    record: Option<u64>,
    n_fft: Option<u32>,
    hop_length: Option<u32>,
    out: Option<String>,
}

fn usage(msg: impl Into<String>) -> AppError {
    AppError::Usage(format!("{}\n{USAGE}", msg.into()))
}

fn number<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Result<T> {
    let value = value.ok_or_else(|| usage(format!("{flag} requires a value")))?;
    value
        .parse()
        .map_err(|_| usage(format!("{flag}: not a valid number: {value}")))
}

fn split_flags(args: impl IntoIterator<Item = String>) -> Result<Parsed> {
    let mut parsed = Parsed::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--seconds" => parsed.seconds = Some(number(&arg, args.next())?),
            "--record" => parsed.record = Some(number(&arg, args.next())?),
            "--n-fft" => parsed.n_fft = Some(number(&arg, args.next())?),
            "--hop-length" => parsed.hop_length = Some(number(&arg, args.next())?),
            "--out" => {
                parsed.out = Some(args.next().ok_or_else(|| usage("--out requires a value"))?)
            }
            flag if flag.starts_with("--") => return Err(usage(format!("unknown flag {flag}"))),
            _ => parsed.positional.push(arg),
        }
    }
    Ok(parsed)
}

impl Command {
    /// Разбирает аргументы (без имени программы).
    pub fn parse(args: Vec<String>) -> Result<Self> {
        let mut args = args.into_iter();
        let name = args.next().ok_or_else(|| usage("missing command"))?;
        let p = split_flags(args)?;
        let positional = p.positional.len();

        match (name.as_str(), positional) {
            ("record", 0) => {
                let seconds = p.seconds.ok_or_else(|| usage("record requires --seconds"))?;
                Ok(Command::Record {
                    seconds,
                    out: p.out,
                })
            }
            ("embed", 1) if p.record.is_some() => Ok(Command::Embed {
                audio: AudioSource::Microphone {
                    seconds: p.record.unwrap_or_default(),
                },
                image: PathBuf::from(&p.positional[0]),
                n_fft: p.n_fft,
                hop_length: p.hop_length,
                out: p.out,
            }),
            ("embed", 2) if p.record.is_none() => Ok(Command::Embed {
                audio: AudioSource::File(PathBuf::from(&p.positional[0])),
                image: PathBuf::from(&p.positional[1]),
                n_fft: p.n_fft,
                hop_length: p.hop_length,
                out: p.out,
            }),
            ("extract", 1) => Ok(Command::Extract {
                image: PathBuf::from(&p.positional[0]),
                out: p.out,
            }),
            ("download", 2) => {
                let kind = match p.positional[1].as_str() {
                    "image" => DownloadKind::Image,
                    "audio" => DownloadKind::Audio,
                    other => return Err(usage(format!("unknown artifact kind {other}"))),
                };
                Ok(Command::Download {
                    file_id: p.positional[0].clone(),
                    kind,
                    out: p.out,
                })
            }
            ("health", 0) => Ok(Command::Health),
            ("record" | "embed" | "extract" | "download" | "health", _) => {
                Err(usage(format!("wrong arguments for {name}")))
            }
            _ => Err(usage(format!("unknown command {name}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn parse_should_read_embed_with_files() {
        // Given / When
        let cmd = Command::parse(args("embed voice.wav cover.png --n-fft 2048 --hop-length 512")).unwrap();

        // Then
        assert_eq!(
            cmd,
            Command::Embed {
                audio: AudioSource::File(PathBuf::from("voice.wav")),
                image: PathBuf::from("cover.png"),
                n_fft: Some(2048),
                hop_length: Some(512),
                out: None,
            }
        );
    }

    #[test]
    fn parse_should_read_embed_from_microphone() {
        let cmd = Command::parse(args("embed --record 5 cover.png --out secret.png")).unwrap();
        assert_eq!(
            cmd,
            Command::Embed {
                audio: AudioSource::Microphone { seconds: 5 },
                image: PathBuf::from("cover.png"),
                n_fft: None,
                hop_length: None,
                out: Some("secret.png".to_string()),
            }
        );
    }

    #[test]
    fn parse_should_read_download_kind() {
        let cmd = Command::parse(args("download 1234 audio")).unwrap();
        assert_eq!(
            cmd,
            Command::Download {
                file_id: "1234".to_string(),
                kind: DownloadKind::Audio,
                out: None,
            }
        );
    }

    #[test]
    fn parse_should_require_seconds_for_record() {
        let err = Command::parse(args("record")).unwrap_err();
        assert!(matches!(err, AppError::Usage(_)));
    }

    #[test]
    fn parse_should_reject_bad_number() {
        let err = Command::parse(args("embed a.wav b.png --n-fft big")).unwrap_err();
        assert!(err.to_string().contains("not a valid number"), "got: {err}");
    }

    #[test]
    fn parse_should_reject_unknown_command_and_flag() {
        assert!(Command::parse(args("play x.wav")).is_err());
        assert!(Command::parse(args("extract x.png --verbose")).is_err());
        assert!(Command::parse(Vec::new()).is_err());
    }

    #[test]
    fn parse_should_reject_audio_file_together_with_record() {
        assert!(Command::parse(args("embed --record 3 voice.wav cover.png")).is_err());
    }
}
