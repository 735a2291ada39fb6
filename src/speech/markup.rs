//! SSML document construction for synthesis requests

/// Escape text for embedding in an SSML element
#[must_use]
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Build the SSML document for one spoken sentence.
///
/// `speaker_profile` wraps the text in a personal-voice embedding element;
/// `trailing_silence_ms` appends a break so queued sentences do not run
/// into each other.
#[must_use]
pub fn build_ssml(
    voice: &str,
    speaker_profile: Option<&str>,
    text: &str,
    trailing_silence_ms: u64,
) -> String {
    let mut body = escape(text);
    if trailing_silence_ms > 0 {
        body.push_str(&format!("<break time='{trailing_silence_ms}ms'/>"));
    }
    if let Some(profile) = speaker_profile {
        body = format!(
            "<mstts:ttsembedding speakerProfileId='{profile}'>\
             <mstts:leadingsilence-exact value='0'/>{body}</mstts:ttsembedding>"
        );
    }
    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' \
         xmlns:mstts='http://www.w3.org/2001/mstts' xml:lang='en-US'>\
         <voice name='{voice}'>{body}</voice></speak>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(escape("a < b & c > d"), "a &lt; b &amp; c &gt; d");
    }

    #[test]
    fn plain_document_has_voice_and_text() {
        let ssml = build_ssml("en-US-AmandaMultilingualNeural", None, "Hello.", 0);
        assert!(ssml.contains("<voice name='en-US-AmandaMultilingualNeural'>Hello.</voice>"));
        assert!(!ssml.contains("break"));
    }

    #[test]
    fn trailing_silence_appends_break() {
        let ssml = build_ssml("v", None, "Hi", 2000);
        assert!(ssml.contains("Hi<break time='2000ms'/>"));
    }

    #[test]
    fn speaker_profile_wraps_in_embedding() {
        let ssml = build_ssml("v", Some("profile-1"), "Hi", 0);
        assert!(ssml.contains("speakerProfileId='profile-1'"));
        assert!(ssml.contains("leadingsilence-exact"));
    }
}
