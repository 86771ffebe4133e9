use std::{fmt, path::Path, str::FromStr};

/// Audio codec Audio Only downloads are converted to
pub const AUDIO_CODEC: &str = "mp3";
/// Bitrate of the converted audio, in kbps
pub const AUDIO_BITRATE_KBPS: u32 = 192;
/// Container video downloads are merged into
pub const VIDEO_CONTAINER: &str = "mp4";

/// Quality presets offered in the dropdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    #[default]
    Best,
    P1080,
    P720,
    P480,
    P360,
    AudioOnly,
}

impl Quality {
    pub const ALL: [Quality; 6] = [
        Quality::Best,
        Quality::P1080,
        Quality::P720,
        Quality::P480,
        Quality::P360,
        Quality::AudioOnly,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Quality::Best => "Best Quality",
            Quality::P1080 => "1080p",
            Quality::P720 => "720p",
            Quality::P480 => "480p",
            Quality::P360 => "360p",
            Quality::AudioOnly => "Audio Only",
        }
    }

    fn max_height(self) -> Option<u32> {
        match self {
            Quality::P1080 => Some(1080),
            Quality::P720 => Some(720),
            Quality::P480 => Some(480),
            Quality::P360 => Some(360),
            Quality::Best | Quality::AudioOnly => None,
        }
    }

    /// Resolves the preset to the format expression and post-processing steps
    /// handed to the media-fetch library.
    pub fn selection(self, embed_thumbnail: bool) -> FormatSelection {
        let format_spec = match (self, self.max_height()) {
            (Quality::AudioOnly, _) => "bestaudio".to_owned(),
            (_, Some(h)) => format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]/best"),
            (_, None) => "bestvideo+bestaudio/best".to_owned(),
        };

        let mut postprocess = Vec::new();
        if self == Quality::AudioOnly {
            postprocess.push(PostProcess::ExtractAudio {
                codec: AUDIO_CODEC,
                bitrate_kbps: AUDIO_BITRATE_KBPS,
            });
        } else {
            postprocess.push(PostProcess::MergeInto(VIDEO_CONTAINER));
        }
        if embed_thumbnail {
            postprocess.push(PostProcess::EmbedThumbnail);
        }

        FormatSelection {
            format_spec,
            extension: self.extension(),
            postprocess,
        }
    }

    pub fn extension(self) -> &'static str {
        if self == Quality::AudioOnly { AUDIO_CODEC } else { VIDEO_CONTAINER }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quality::ALL
            .into_iter()
            .find(|q| q.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown quality preset: {s}"))
    }
}

/// A post-processing step requested from the media-fetch library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostProcess {
    ExtractAudio { codec: &'static str, bitrate_kbps: u32 },
    MergeInto(&'static str),
    EmbedThumbnail,
}

/// Concrete download parameters derived from a [`Quality`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSelection {
    pub format_spec: String,
    /// Extension of the final file
    pub extension: &'static str,
    pub postprocess: Vec<PostProcess>,
}

/// `<output_directory>/%(title)s.%(ext)s`; the library substitutes title and extension
pub fn output_template(output_directory: &Path) -> String {
    output_directory.join("%(title)s.%(ext)s").to_string_lossy().into_owned()
}
