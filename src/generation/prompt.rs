use crate::models::SizePreset;

fn orientation(size: SizePreset) -> &'static str {
    match size {
        SizePreset::Square => "square",
        SizePreset::Portrait => "vertical",
        SizePreset::Landscape => "horizontal",
    }
}

fn product_clause(has_reference_images: bool) -> String {
    if has_reference_images {
        "PRODUCT PHOTOS: Turn the attached product photos into professional studio-grade \
         images. Preserve every original detail, colour and the real structure of the product, \
         apply dramatic premium lighting and styling, and integrate them seamlessly into the banner."
            .to_string()
    } else {
        "PRODUCT IMAGE: No product photo was supplied. Generate a photorealistic, studio-quality \
         image of the product described in the briefing and make it the focal point of the banner."
            .to_string()
    }
}

fn branding_clause(
    has_logo: bool,
    has_reference_images: bool,
    brand_name: Option<&str>,
) -> Option<String> {
    if has_logo {
        let which = if has_reference_images {
            "the first attached image"
        } else {
            "the attached image"
        };
        return Some(format!(
            "BRAND IDENTITY: The logo is {}. Place it naturally and professionally in a corner \
             or at the bottom centre of the banner, and build the colour palette around the \
             logo's colours.",
            which
        ));
    }

    brand_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            format!(
                "BRAND IDENTITY: Display the business name \"{}\" in elegant premium typography \
                 that matches the design.",
                name
            )
        })
}

/// Builds the instruction block sent to the image model. Pure and deterministic;
/// the briefing is embedded verbatim, even when empty.
pub fn compose_prompt(
    briefing: &str,
    size: SizePreset,
    has_reference_images: bool,
    has_logo: bool,
    brand_name: Option<&str>,
) -> String {
    let mut rules = vec![product_clause(has_reference_images)];
    if let Some(branding) = branding_clause(has_logo, has_reference_images, brand_name) {
        rules.push(branding);
    }
    rules.push(
        "CONTACT DETAILS: If the briefing contains a phone number, WhatsApp, address, prices \
         or product lists (menus), lay them out elegantly, legibly and professionally with \
         premium typography."
            .to_string(),
    );
    rules.push(
        "AESTHETICS: The design must feel vibrant, premium and instantly appetizing.".to_string(),
    );
    rules.push("Return the banner DIRECTLY as an inline image attachment.".to_string());
    rules.push("If the attachment fails, return ONLY the raw Base64 code of the image.".to_string());
    rules.push(
        "Do not write explanatory text before or after the image. Every word on the banner \
         must be in Brazilian Portuguese with flawless grammar."
            .to_string(),
    );

    let numbered: Vec<String> = rules
        .iter()
        .enumerate()
        .map(|(i, rule)| format!("{}. {}", i + 1, rule))
        .collect();

    format!(
        "You are a world-class advertising art director specialised in premium food and \
         local-business marketing.\n\
         Your task is to create ONE advertising banner at {width}x{height} ({orientation}).\n\
         \n\
         FORMAT: {label}\n\
         \n\
         CRITICAL DESIGN RULES:\n\
         {rules}\n\
         \n\
         BRIEFING: \"{briefing}\"",
        width = size.width(),
        height = size.height(),
        orientation = orientation(size),
        label = size.label(),
        rules = numbered.join("\n"),
        briefing = briefing,
    )
}

/// Instruction for the social-media caption that accompanies a banner.
pub fn compose_caption_prompt(briefing: &str) -> String {
    format!(
        "You are an expert food and hospitality copywriter.\n\
         Write a persuasive caption for an Instagram and WhatsApp post based on the briefing below.\n\
         \n\
         RULES:\n\
         1. CUSTOMER FOCUS: The language must make the reader hungry and create immediate desire.\n\
         2. STRUCTURE: a strong opening hook; a body with benefits and a mouth-watering \
         description; a clear call to action (for example \"Order through the link in bio\"); \
         strategic food emojis; at most 5 relevant hashtags at the end.\n\
         3. TONE: friendly, vibrant and professional.\n\
         4. LANGUAGE: Brazilian Portuguese.\n\
         5. LENGTH: at most 1500 characters.\n\
         \n\
         BRIEFING: \"{}\"",
        briefing
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_give_identical_prompts() {
        let a = compose_prompt("Pizza night", SizePreset::Portrait, true, false, Some("Nonna"));
        let b = compose_prompt("Pizza night", SizePreset::Portrait, true, false, Some("Nonna"));
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn includes_preset_resolution() {
        let prompt = compose_prompt("x", SizePreset::Landscape, false, false, None);
        assert!(prompt.contains("1280x720 (horizontal)"));
        assert!(prompt.contains("FORMAT: Horizontal (video cover)"));
    }

    #[test]
    fn logo_takes_precedence_over_brand_name() {
        let prompt = compose_prompt("x", SizePreset::Square, false, true, Some("Nonna"));
        assert!(prompt.contains("logo's colours"));
        assert!(!prompt.contains("\"Nonna\""));
    }

    #[test]
    fn brand_name_used_without_logo() {
        let prompt = compose_prompt("x", SizePreset::Square, false, false, Some("Nonna"));
        assert!(prompt.contains("business name \"Nonna\""));
    }

    #[test]
    fn no_branding_clause_without_logo_or_name() {
        let prompt = compose_prompt("x", SizePreset::Square, false, false, Some("   "));
        assert!(!prompt.contains("BRAND IDENTITY"));
        assert!(prompt.contains("1. PRODUCT IMAGE"));
        assert!(prompt.contains("2. CONTACT DETAILS"));
    }

    #[test]
    fn product_clause_depends_on_reference_images() {
        let with = compose_prompt("x", SizePreset::Square, true, true, None);
        assert!(with.contains("PRODUCT PHOTOS"));
        assert!(with.contains("the first attached image"));
        let without = compose_prompt("x", SizePreset::Square, false, false, None);
        assert!(without.contains("photorealistic"));
    }

    #[test]
    fn empty_briefing_passes_through() {
        let prompt = compose_prompt("", SizePreset::Square, false, false, None);
        assert!(prompt.ends_with("BRIEFING: \"\""));
    }
}
