//! Waiver rendering — the document collaborator consumed by the coordinator.
//!
//! The `WaiverRenderer` trait defines the interface: hand over the signed
//! participant's details, get back the path of the produced artifact or a
//! `RenderError`. The coordinator treats the call as a black box; it only
//! cares about success/failure and that the artifact exists afterwards.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use chrono::Local;
use printpdf::image_crate::codecs::png::PngDecoder;
use printpdf::{BuiltinFont, Image, ImageTransform, Mm, PdfDocument};

/// Everything needed to produce one signed waiver document.
#[derive(Clone, Debug)]
pub struct WaiverRequest {
    pub player_name: String,
    pub activity_type: Option<String>,
    /// Signature image as a data URI (`data:image/png;base64,...`) or bare
    /// base64, as captured by the kiosk's signature pad.
    pub signature_data: String,
    pub birthdate: Option<String>,
    pub output_path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("invalid signature data: {0}")]
    InvalidSignature(String),
    #[error("failed to compose waiver document: {0}")]
    Composition(String),
    #[error("failed to write waiver document: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait WaiverRenderer: Send + Sync {
    async fn render(&self, request: WaiverRequest) -> Result<PathBuf, RenderError>;
}

const ESIGN_FOOTER: &str = "This document was electronically signed and is legally \
     binding according to Electronic Signatures in Global and National Commerce Act (E-Sign).";

const WRAP_COLUMNS: usize = 95;

/// Renders the liability waiver as a single-page A4 PDF: header, release
/// clauses, the decoded signature image (or a textual placeholder when the
/// image is unusable), and the e-signature footer.
pub struct DocumentRenderer {
    company_name: String,
}

impl Default for DocumentRenderer {
    fn default() -> Self {
        Self::new("COMPANY NAME")
    }
}

impl DocumentRenderer {
    pub fn new(company_name: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
        }
    }

    /// Body text as wrapped lines; an empty line separates paragraphs.
    fn waiver_lines(&self, request: &WaiverRequest) -> Vec<String> {
        let activity = activity_label(request.activity_type.as_deref());
        let today = Local::now().format("%Y-%m-%d").to_string();
        let mut lines = Vec::new();

        lines.extend(wrap(
            &format!(
                "I, {}, understand that participation in {} activities involves inherent \
                 risks of injury or damage to myself or others.",
                request.player_name, activity
            ),
            WRAP_COLUMNS,
        ));
        lines.push(String::new());

        lines.push("By signing this waiver, I acknowledge these risks and agree to:".into());
        for (i, item) in [
            "Follow all safety instructions provided by staff",
            "Use all equipment properly and as directed",
            "Accept full responsibility for my actions during the activity",
            "Pay for any damages I cause to equipment or facilities",
        ]
        .iter()
        .enumerate()
        {
            lines.push(format!("{}. {item}", i + 1));
        }
        lines.push(String::new());

        lines.extend(wrap(
            &format!(
                "I hereby release {}, its employees, and representatives from any liability \
                 for injuries, damages, or losses that may occur during my participation.",
                self.company_name
            ),
            WRAP_COLUMNS,
        ));
        lines.push(String::new());

        lines.extend(wrap(
            &format!(
                "I understand that {} reserves the right to remove any participant from the \
                 activity for unsafe behavior without refund. I also grant permission to use \
                 my likeness in photographs or videos for promotional purposes without \
                 compensation.",
                self.company_name
            ),
            WRAP_COLUMNS,
        ));
        lines.push(String::new());

        lines.push(format!("Participant Name: {}", request.player_name));
        if let Some(birthdate) = &request.birthdate {
            lines.push(format!("Birthdate: {birthdate}"));
        }
        lines.push(format!("Date: {today}"));
        lines
    }

    fn compose(&self, request: &WaiverRequest, signature_png: &[u8]) -> Result<Vec<u8>, RenderError> {
        let (doc, page, layer) =
            PdfDocument::new("Liability Waiver and Release", Mm(210.0), Mm(297.0), "waiver");
        let layer = doc.get_page(page).get_layer(layer);
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(composition_error)?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(composition_error)?;
        let italic = doc
            .add_builtin_font(BuiltinFont::HelveticaOblique)
            .map_err(composition_error)?;

        let margin = Mm(20.0);
        let mut y = 275.0_f32;

        layer.use_text(&self.company_name, 20.0, margin, Mm(y), &bold);
        y -= 10.0;
        let activity = activity_label(request.activity_type.as_deref());
        layer.use_text(
            format!(
                "LIABILITY WAIVER AND RELEASE FORM - {}",
                activity.to_uppercase()
            ),
            13.0,
            margin,
            Mm(y),
            &bold,
        );
        y -= 12.0;

        for line in self.waiver_lines(request) {
            if !line.is_empty() {
                layer.use_text(line, 11.0, margin, Mm(y), &regular);
            }
            y -= 6.0;
        }

        y -= 4.0;
        layer.use_text("Participant Signature:", 11.0, margin, Mm(y), &regular);
        y -= 45.0;
        match signature_image(signature_png) {
            Some(image) => {
                image.add_to_layer(
                    layer.clone(),
                    ImageTransform {
                        translate_x: Some(margin),
                        translate_y: Some(Mm(y)),
                        dpi: Some(300.0),
                        ..ImageTransform::default()
                    },
                );
            }
            // Same fallback the kiosks are used to: an unusable image
            // still yields a signed document.
            None => {
                layer.use_text(
                    "[Electronic signature applied]",
                    11.0,
                    margin,
                    Mm(y + 20.0),
                    &italic,
                );
            }
        }

        let mut footer_y = 14.0_f32;
        for line in wrap(ESIGN_FOOTER, 110) {
            layer.use_text(line, 8.0, margin, Mm(footer_y), &regular);
            footer_y -= 4.0;
        }

        doc.save_to_bytes().map_err(composition_error)
    }
}

#[async_trait]
impl WaiverRenderer for DocumentRenderer {
    async fn render(&self, request: WaiverRequest) -> Result<PathBuf, RenderError> {
        let signature = decode_signature(&request.signature_data)?;
        let document = self.compose(&request, &signature)?;

        if let Some(parent) = request.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&request.output_path, document).await?;

        tracing::info!(path = %request.output_path.display(), "Waiver document written");
        Ok(request.output_path)
    }
}

/// Build the destination filename for a signed waiver: spaces in the name
/// become underscores, the timestamp drops characters unfit for filenames.
pub fn waiver_output_path(storage_dir: &Path, player_name: &str) -> PathBuf {
    let safe_name = player_name.split_whitespace().collect::<Vec<_>>().join("_");
    let timestamp = Local::now()
        .format("%Y-%m-%dT%H-%M-%S%.3f")
        .to_string()
        .replace(['.', ':'], "-");
    storage_dir.join(format!("{safe_name}_{timestamp}.pdf"))
}

fn activity_label(activity_type: Option<&str>) -> &str {
    match activity_type {
        Some("laser-tag") => "Laser Tag",
        Some("escape-room") => "Escape Room",
        Some(other) => other,
        None => "the scheduled activity",
    }
}

/// Accepts `data:image/...;base64,<payload>` or bare base64.
fn decode_signature(signature_data: &str) -> Result<Vec<u8>, RenderError> {
    let payload = match signature_data.split_once("base64,") {
        Some((_, rest)) => rest,
        None => signature_data,
    };
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| RenderError::InvalidSignature(e.to_string()))
}

fn signature_image(png: &[u8]) -> Option<Image> {
    let decoder = PngDecoder::new(Cursor::new(png)).ok()?;
    Image::try_from(decoder).ok()
}

fn composition_error(e: printpdf::Error) -> RenderError {
    RenderError::Composition(e.to_string())
}

/// Greedy word wrap; words longer than the width get a line of their own.
fn wrap(text: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > columns {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
