//! Kokoro voice catalogue and voice selection.
//!
//! Each voice carries the BCP 47 language tag it speaks so a voice can be picked
//! from the conversation language when no voice name is configured.

/// A Kokoro TTS voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voice {
    pub name: &'static str,
    pub speaker_id: i32,
    /// BCP 47 language tag, e.g. "en-US"
    pub lang: &'static str,
}

impl Voice {
    /// Lexicon files used by Kokoro for this voice. Empty for languages that
    /// go through espeak-ng instead.
    pub fn lexicons(&self) -> &'static [&'static str] {
        match self.name.get(..2) {
            Some("af" | "am") => &["lexicon-us-en.txt"],
            Some("bf" | "bm") => &["lexicon-gb-en.txt"],
            Some("zf" | "zm") => &["lexicon-us-en.txt", "lexicon-zh.txt"],
            _ => &[],
        }
    }

    /// espeak-ng language for voices without a lexicon, empty otherwise.
    pub fn espeak_language(&self) -> &'static str {
        if !self.lexicons().is_empty() {
            return "";
        }
        match self.lang {
            "pt-BR" => "pt-br",
            lang => lang.split('-').next().unwrap_or_default(),
        }
    }
}

const fn voice(name: &'static str, speaker_id: i32, lang: &'static str) -> Voice {
    Voice { name, speaker_id, lang }
}

/// Kokoro v1.0 voices in speaker-id order.
const VOICES: &[Voice] = &[
    voice("af_alloy", 0, "en-US"),
    voice("af_aoede", 1, "en-US"),
    voice("af_bella", 2, "en-US"),
    voice("af_heart", 3, "en-US"),
    voice("af_jessica", 4, "en-US"),
    voice("af_kore", 5, "en-US"),
    voice("af_nicole", 6, "en-US"),
    voice("af_nova", 7, "en-US"),
    voice("af_river", 8, "en-US"),
    voice("af_sarah", 9, "en-US"),
    voice("af_sky", 10, "en-US"),
    voice("am_adam", 11, "en-US"),
    voice("am_echo", 12, "en-US"),
    voice("am_eric", 13, "en-US"),
    voice("am_fenrir", 14, "en-US"),
    voice("am_liam", 15, "en-US"),
    voice("am_michael", 16, "en-US"),
    voice("am_onyx", 17, "en-US"),
    voice("am_puck", 18, "en-US"),
    voice("am_santa", 19, "en-US"),
    voice("bf_alice", 20, "en-GB"),
    voice("bf_emma", 21, "en-GB"),
    voice("bf_isabella", 22, "en-GB"),
    voice("bf_lily", 23, "en-GB"),
    voice("bm_daniel", 24, "en-GB"),
    voice("bm_fable", 25, "en-GB"),
    voice("bm_george", 26, "en-GB"),
    voice("bm_lewis", 27, "en-GB"),
    voice("ef_dora", 28, "es-ES"),
    voice("em_alex", 29, "es-ES"),
    voice("ff_siwis", 30, "fr-FR"),
    voice("hf_alpha", 31, "hi-IN"),
    voice("hf_beta", 32, "hi-IN"),
    voice("hm_omega", 33, "hi-IN"),
    voice("hm_psi", 34, "hi-IN"),
    voice("if_sara", 35, "it-IT"),
    voice("im_nicola", 36, "it-IT"),
    voice("jf_alpha", 37, "ja-JP"),
    voice("jf_gongitsune", 38, "ja-JP"),
    voice("jf_nezumi", 39, "ja-JP"),
    voice("jf_tebukuro", 40, "ja-JP"),
    voice("jm_kumo", 41, "ja-JP"),
    voice("pf_dora", 42, "pt-BR"),
    voice("pm_alex", 43, "pt-BR"),
    voice("pm_santa", 44, "pt-BR"),
    voice("zf_xiaobei", 45, "zh-CN"),
    voice("zf_xiaoni", 46, "zh-CN"),
    voice("zf_xiaoxiao", 47, "zh-CN"),
    voice("zf_xiaoyi", 48, "zh-CN"),
    voice("zm_yunjian", 49, "zh-CN"),
    voice("zm_yunxi", 50, "zh-CN"),
    voice("zm_yunxia", 51, "zh-CN"),
    voice("zm_yunyang", 52, "zh-CN"),
];

/// Look up a voice by exact name.
pub fn get_voice(name: &str) -> Option<&'static Voice> {
    VOICES.iter().find(|v| v.name == name)
}

/// Pick the synthesis voice.
///
/// The preferred name wins when it exists. Otherwise the first voice whose
/// language tag starts with the requested language (so "en" matches "en-US"),
/// then the first voice sharing the primary language subtag, then the first voice.
pub fn select_voice(preferred: Option<&str>, language: &str) -> &'static Voice {
    if let Some(voice) = preferred.and_then(get_voice) {
        return voice;
    }
    let language = language.replace('_', "-").to_ascii_lowercase();
    let primary = language.split('-').next().unwrap_or_default().to_string();

    VOICES
        .iter()
        .find(|v| v.lang.to_ascii_lowercase().starts_with(&language))
        .or_else(|| VOICES.iter().find(|v| v.lang.to_ascii_lowercase().split('-').next() == Some(primary.as_str())))
        .unwrap_or(&VOICES[0])
}

/// Print all available voices grouped by language.
pub fn print_voices() {
    println!("Kokoro TTS v1.0 - {} voices", VOICES.len());

    let mut languages: Vec<&str> = VOICES.iter().map(|v| v.lang).collect();
    languages.dedup();

    for lang in languages {
        println!("\n── {} ──", lang);
        println!("{:<15} ID", "VOICE");
        for voice in VOICES.iter().filter(|v| v.lang == lang) {
            println!("{:<15} {}", voice.name, voice.speaker_id);
        }
    }

    println!();
    println!("Usage:");
    println!("  ./voice-consult --language en-GB");
    println!("  ./voice-consult --tts-voice af_heart");
}
