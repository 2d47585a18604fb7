use serde::Serialize;

/// Parameters of one recognition session, sent once as the first upstream frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSessionConfig {
    pub user_id: String,
    pub sample_rate_hz: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
    pub model_name: String,
}

impl Default for AudioSessionConfig {
    /// 16 kHz, 16-bit signed, mono PCM.
    fn default() -> Self {
        Self {
            user_id: "interview-api".to_string(),
            sample_rate_hz: 16_000,
            bits_per_sample: 16,
            channels: 1,
            model_name: "bigmodel".to_string(),
        }
    }
}

#[derive(Serialize)]
struct VendorFrame<'a> {
    user: VendorUser<'a>,
    audio: VendorAudio,
    request: VendorRequest<'a>,
}

#[derive(Serialize)]
struct VendorUser<'a> {
    uid: &'a str,
}

#[derive(Serialize)]
struct VendorAudio {
    format: &'static str,
    rate: u32,
    bits: u16,
    channel: u16,
}

#[derive(Serialize)]
struct VendorRequest<'a> {
    model_name: &'a str,
    show_utterances: bool,
}

impl AudioSessionConfig {
    /// Serializes the config in the shape the recognition socket expects.
    pub fn to_vendor_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&VendorFrame {
            user: VendorUser { uid: &self.user_id },
            audio: VendorAudio {
                format: "pcm",
                rate: self.sample_rate_hz,
                bits: self.bits_per_sample,
                channel: self.channels,
            },
            request: VendorRequest {
                model_name: &self.model_name,
                show_utterances: true,
            },
        })
    }
}
