/// Label used when the garment description is blank.
pub const FALLBACK_GARMENT_LABEL: &str = "garment";

/// Instruction sent with the garment image to obtain its description.
pub const DESCRIPTION_INSTRUCTION: &str = "ONLY RETURN THE GARMENT TYPE AND KEY FEATURES, IN ENGLISH. Example: 'Anorak: Lightweight nylon, short zipper, hood with drawcord, color-block on shoulders and sleeves. Logo ...'.";

pub const GARMENT_IMAGE_LABEL: &str = "IMAGE_1 (garment reference):";
pub const TARGET_IMAGE_LABEL: &str = "IMAGE_2 (base/final target):";

/// Section headings in the order they appear in every rendered prompt.
pub const PROMPT_SECTIONS: [&str; 4] = [
    "I. Garment Extraction and Preservation (IMAGE_1)",
    "II. Integration into IMAGE_2",
    "III. IMAGE_2 Preservation (Non-Negotiable)",
    "Negative Constraints",
];

/// Trimmed description, or the fallback label when blank.
pub fn garment_label(description: &str) -> &str {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        FALLBACK_GARMENT_LABEL
    } else {
        trimmed
    }
}

/// Renders the edit instruction for `description`.
pub fn build_prompt(description: &str) -> String {
    let garment = garment_label(description);
    let [extraction, integration, preservation, negative] = PROMPT_SECTIONS;
    format!(
        "{extraction}
Precisely isolate the {garment} in IMAGE_1, excluding all other elements (background, subject's body, face).
Maintain the exact color, texture, silhouette, dimensions, patterns (logos/prints), seams and construction details of the {garment}. Include pockets, buttons, zippers, drawcords, etc.
Use only garment pixels/features from IMAGE_1; do not synthesize new artwork or branding.

{integration}
Completely replace the existing garment in IMAGE_2 with the extracted {garment}. Do not combine or blend any elements of the original garment in IMAGE_2.
Match scale, perspective and orientation of the extracted {garment} to the subject's pose in IMAGE_2 so it drapes naturally (gravity, folds, volume).
Adapt lighting, shadows and reflections on the inserted {garment} to the light of IMAGE_2, including realistic contact shadows.

{preservation}
The subject's face in IMAGE_2 must remain 100% identical to the original.
Hair, accessories, other clothing and the entire background of IMAGE_2 must remain unchanged.
Edits are strictly limited to the replaced {garment} region; no spillover or unintended changes.

{negative}
Do not fuse any features of the original IMAGE_2 garment with the {garment} from IMAGE_1.
Do not alter the subject's face, hair, expression, accessories, or background.
Do not add shadows/reflections/effects beyond those caused by the inserted {garment} and its interaction with existing lighting.
Avoid blending or warping that compromises the natural appearance and volume of the inserted {garment}.

Expected Output
Return IMAGE_2 with the new {garment} integrated realistically and naturally, keeping face and background unchanged, as if the {garment} had always been in the original image."
    )
}
