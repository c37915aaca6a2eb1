use crate::models::{Artifact, InlineImage, ModelResponse, ResponsePart};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;

/// Mime type assumed for attachments that do not declare one.
const ATTACHMENT_DEFAULT_MIME: &str = "image/jpeg";

/// Runs of base64 alphabet within one line, with optional padding.
/// A `data:image/...;base64,` header never joins a run because `:`, `;` and `,`
/// are outside the alphabet.
static BASE64_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9+/]+={0,2}").expect("valid base64 pattern"));

static BASE64_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9+/]+={0,2}$").expect("valid base64 line pattern"));

/// Widest line still treated as part of a wrapped (MIME/PEM style) payload.
const MAX_WRAP_WIDTH: usize = 256;

/// Locates the generated image inside a provider response.
#[derive(Debug, Clone)]
pub struct ResultExtractor {
    min_base64_length: usize,
}

impl ResultExtractor {
    pub fn new(min_base64_length: usize) -> Self {
        Self { min_base64_length }
    }

    /// Structured attachment first, then the text heuristic. `None` means no usable image.
    pub fn extract(&self, response: &ModelResponse) -> Option<Artifact> {
        if let Some(artifact) = structured_attachment(response) {
            return Some(artifact);
        }

        let text = response.text();
        if text.is_empty() {
            return None;
        }

        let image = find_base64_image(&text, self.min_base64_length)?;
        log::warn!(
            "Model {} returned the banner as text; recovered {} bytes of {}",
            response.model,
            image.data.len(),
            image.mime_type
        );
        Some(Artifact {
            mime_type: image.mime_type,
            data: image.data,
            model: response.model.clone(),
        })
    }
}

fn structured_attachment(response: &ModelResponse) -> Option<Artifact> {
    response.parts.iter().find_map(|part| match part {
        ResponsePart::InlineData { mime_type, data } if !data.is_empty() => Some(Artifact {
            mime_type: mime_type
                .as_deref()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(ATTACHMENT_DEFAULT_MIME)
                .to_string(),
            data: data.clone(),
            model: response.model.clone(),
        }),
        _ => None,
    })
}

/// Heuristic fallback for providers that answer with base64 in free text.
///
/// Takes the first run of at least `min_length` base64 characters that decodes
/// and infers the mime type from the decoded bytes. Runs never cross a line
/// break, except for fixed-width wrapped payloads that start a line or follow a
/// `base64,` header.
pub fn find_base64_image(text: &str, min_length: usize) -> Option<InlineImage> {
    base64_candidates(text).into_iter().find_map(|cleaned| {
        let body = cleaned.trim_end_matches('=');
        if body.len() < min_length.max(4) {
            return None;
        }

        let candidate = if cleaned.len() % 4 == 0 {
            cleaned.as_str()
        } else {
            &body[..body.len() - body.len() % 4]
        };

        match STANDARD.decode(candidate) {
            Ok(data) if !data.is_empty() => Some(InlineImage::new(sniff_mime(&data), data)),
            Ok(_) => None,
            Err(e) => {
                log::debug!("Discarding base64-looking run of {} chars: {}", body.len(), e);
                None
            }
        }
    })
}

/// Base64 runs in reading order, with wrapped payloads joined back together.
fn base64_candidates(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let mut candidates = Vec::new();
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];
        let runs: Vec<_> = BASE64_RUN.find_iter(line).collect();
        let mut joined_lines = 0;

        for (position, run) in runs.iter().enumerate() {
            let starts_wrapped_block = position + 1 == runs.len()
                && run.end() == line.len()
                && run.as_str().len() <= MAX_WRAP_WIDTH
                && !run.as_str().ends_with('=')
                && (run.start() == 0 || line[..run.start()].ends_with("base64,"));

            if starts_wrapped_block {
                let (block, used) = join_wrapped(run.as_str(), run.start() == 0, &lines[index + 1..]);
                if used > 0 {
                    candidates.push(block);
                    joined_lines = used;
                    continue;
                }
            }
            candidates.push(run.as_str().to_string());
        }

        index += 1 + joined_lines;
    }

    candidates
}

/// Appends the continuation lines of a wrapped payload: whole base64 lines of
/// one width, ending at the first shorter or padded line. A block that starts
/// a line must have a full-width first line.
fn join_wrapped(first: &str, starts_line: bool, rest: &[&str]) -> (String, usize) {
    let mut block = first.to_string();
    let mut width = None;
    let mut used = 0;

    for line in rest {
        if !BASE64_LINE.is_match(line) {
            break;
        }
        let expected = *width.get_or_insert(line.len());
        if line.len() > expected || expected > MAX_WRAP_WIDTH {
            break;
        }
        if used == 0 && starts_line && first.len() != expected {
            break;
        }
        block.push_str(line);
        used += 1;
        if line.len() < expected || line.ends_with('=') {
            break;
        }
    }

    (block, used)
}

/// Mime type from the leading byte signature; PNG when unrecognised.
pub fn sniff_mime(data: &[u8]) -> &'static str {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        "image/webp"
    } else if data.starts_with(b"GIF8") {
        "image/gif"
    } else {
        "image/png"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg_bytes(len: usize) -> Vec<u8> {
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
        data.extend((0..len).map(|i| (i % 251) as u8));
        data
    }

    #[test]
    fn structured_attachment_wins() {
        let response = ModelResponse::new("gemini-a")
            .with_text("Here you go")
            .with_inline_data(Some("image/png"), vec![1, 2, 3]);
        let artifact = ResultExtractor::new(4000).extract(&response).unwrap();
        assert_eq!(artifact.mime_type, "image/png");
        assert_eq!(artifact.data, vec![1, 2, 3]);
        assert_eq!(artifact.model, "gemini-a");
    }

    #[test]
    fn attachment_without_mime_defaults_to_jpeg() {
        let response = ModelResponse::new("m").with_inline_data(None, vec![9]);
        let artifact = ResultExtractor::new(4000).extract(&response).unwrap();
        assert_eq!(artifact.mime_type, "image/jpeg");
    }

    #[test]
    fn recovers_jpeg_from_text() {
        let encoded = STANDARD.encode(jpeg_bytes(4000));
        assert!(encoded.starts_with("/9j/"));
        let response = ModelResponse::new("gemini-b")
            .with_text(format!("Sure! Here is the banner:\n{}\nEnjoy.", encoded));

        let artifact = ResultExtractor::new(4000).extract(&response).unwrap();
        assert_eq!(artifact.mime_type, "image/jpeg");
        assert_eq!(artifact.data, jpeg_bytes(4000));
        assert_eq!(artifact.model, "gemini-b");
    }

    #[test]
    fn preceding_word_is_not_glued_to_unpadded_payload() {
        let data = jpeg_bytes(3998);
        let encoded = STANDARD.encode(&data);
        assert!(!encoded.ends_with('='));

        let text = format!("Here is your banner\n{}\nEnjoy", encoded);
        let image = find_base64_image(&text, 4000).unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.data, data);
    }

    #[test]
    fn wrapped_payload_on_its_own_lines_is_joined() {
        let data = jpeg_bytes(3998);
        let encoded = STANDARD.encode(&data);
        let wrapped: Vec<String> = encoded
            .as_bytes()
            .chunks(64)
            .map(|c| String::from_utf8(c.to_vec()).unwrap())
            .collect();
        let text = format!("Your banner\nBanner\n{}\nThanks", wrapped.join("\n"));

        let image = find_base64_image(&text, 4000).unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.data, data);
    }

    #[test]
    fn strips_data_uri_header_and_line_breaks() {
        let encoded = STANDARD.encode(jpeg_bytes(3100));
        let wrapped: Vec<String> = encoded
            .as_bytes()
            .chunks(76)
            .map(|c| String::from_utf8(c.to_vec()).unwrap())
            .collect();
        let text = format!("data:image/jpeg;base64,{}", wrapped.join("\r\n"));

        let image = find_base64_image(&text, 4000).unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.data, jpeg_bytes(3100));
    }

    #[test]
    fn unknown_signature_defaults_to_png() {
        let encoded = STANDARD.encode(vec![7u8; 3300]);
        let image = find_base64_image(&encoded, 4000).unwrap();
        assert_eq!(image.mime_type, "image/png");
    }

    #[test]
    fn short_runs_are_ignored() {
        let encoded = STANDARD.encode(jpeg_bytes(100));
        let response = ModelResponse::new("m").with_text(format!("image: {}", encoded));
        assert!(ResultExtractor::new(4000).extract(&response).is_none());
    }

    #[test]
    fn nothing_usable_is_not_found() {
        let extractor = ResultExtractor::new(4000);
        assert!(extractor.extract(&ModelResponse::new("m")).is_none());
        assert!(extractor
            .extract(&ModelResponse::new("m").with_text("I cannot draw that, sorry."))
            .is_none());
    }

    #[test]
    fn sniffs_common_signatures() {
        assert_eq!(sniff_mime(&[0xFF, 0xD8, 0xFF, 0xDB]), "image/jpeg");
        assert_eq!(sniff_mime(b"\x89PNG\r\n\x1a\n"), "image/png");
        assert_eq!(sniff_mime(b"RIFF\0\0\0\0WEBPVP8 "), "image/webp");
        assert_eq!(sniff_mime(b"GIF89a"), "image/gif");
        assert_eq!(sniff_mime(b"hello"), "image/png");
    }
}
