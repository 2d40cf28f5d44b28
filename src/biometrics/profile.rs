use serde::Serialize;

/// Smallest voice level a profile may carry; later ratios divide by it.
pub const VOICE_RMS_FLOOR: f32 = 0.001;

/// Sibilance threshold as a multiple of the calibrated voice ZCR.
pub const SIBILANCE_FACTOR: f32 = 1.5;

/// Below this the voice phase most likely captured nothing but room noise.
const DEGENERATE_VOICE_RMS: f32 = 0.002;

/// Per-session acoustic baseline. Built once, then shared read-only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalibrationProfile {
    #[serde(rename = "noiseRMS")]
    noise_rms: f32,
    #[serde(rename = "noiseZCR")]
    noise_zcr: f32,
    #[serde(rename = "voiceRMS")]
    voice_rms: f32,
    #[serde(rename = "voiceZCR")]
    voice_zcr: f32,
    #[serde(rename = "sibilanceThreshold")]
    sibilance_threshold: f32,
}

impl CalibrationProfile {
    /// `voice_rms` is the raw voice-phase mean; it is baseline-corrected and
    /// floor-clamped here so the stored value is always positive.
    pub fn from_measurements(
        noise_rms: f32,
        noise_zcr: f32,
        voice_rms: f32,
        voice_zcr: f32,
    ) -> Self {
        let noise_rms = sanitize(noise_rms);
        let noise_zcr = sanitize(noise_zcr);
        let voice_zcr = sanitize(voice_zcr);
        let corrected = sanitize(voice_rms) - noise_rms;
        Self {
            noise_rms,
            noise_zcr,
            voice_rms: corrected.max(VOICE_RMS_FLOOR),
            voice_zcr,
            sibilance_threshold: voice_zcr * SIBILANCE_FACTOR,
        }
    }

    pub fn noise_rms(&self) -> f32 {
        self.noise_rms
    }

    pub fn noise_zcr(&self) -> f32 {
        self.noise_zcr
    }

    pub fn voice_rms(&self) -> f32 {
        self.voice_rms
    }

    pub fn voice_zcr(&self) -> f32 {
        self.voice_zcr
    }

    pub fn sibilance_threshold(&self) -> f32 {
        self.sibilance_threshold
    }

    /// True when the voice phase produced too little signal to score against.
    /// The controller still accepts such a profile; callers decide whether to
    /// offer a retry.
    pub fn is_degenerate(&self) -> bool {
        self.voice_rms < DEGENERATE_VOICE_RMS || self.voice_zcr <= 0.0
    }
}

fn sanitize(value: f32) -> f32 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_level_is_baseline_corrected() {
        let profile = CalibrationProfile::from_measurements(0.01, 0.02, 0.05, 0.04);
        assert!((profile.voice_rms() - 0.04).abs() < 1e-6);
        assert!((profile.sibilance_threshold() - 0.06).abs() < 1e-6);
        assert!(!profile.is_degenerate());
    }

    #[test]
    fn voice_level_never_drops_to_zero() {
        for (noise, voice) in [(0.0, 0.0), (0.1, 0.1), (0.3, 0.05), (0.0, f32::NAN)] {
            let profile = CalibrationProfile::from_measurements(noise, 0.0, voice, 0.0);
            assert!(profile.voice_rms() > 0.0, "noise={noise} voice={voice}");
        }
    }

    #[test]
    fn silent_voice_phase_is_degenerate() {
        let profile = CalibrationProfile::from_measurements(0.02, 0.05, 0.02, 0.05);
        assert!(profile.is_degenerate());
    }

    #[test]
    fn serializes_with_camel_case_field_names() {
        let profile = CalibrationProfile::from_measurements(0.01, 0.02, 0.05, 0.04);
        let value = serde_json::to_value(profile).unwrap();
        for key in ["noiseRMS", "noiseZCR", "voiceRMS", "voiceZCR", "sibilanceThreshold"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }
}
