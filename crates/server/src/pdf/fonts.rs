use std::io::ErrorKind;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignatureFont {
    pub family: &'static str,
    pub file: &'static str,
}

pub const SIGNATURE_FONTS: &[SignatureFont] = &[
    SignatureFont { family: "Dancing Script", file: "dancing-script.woff2" },
    SignatureFont { family: "Great Vibes", file: "great-vibes.woff2" },
    SignatureFont { family: "Pacifico", file: "pacifico.woff2" },
    SignatureFont { family: "Satisfy", file: "satisfy.woff2" },
    SignatureFont { family: "Allura", file: "allura.woff2" },
];

pub const FALLBACK_STYLESHEET: &str = concat!(
    "https://fonts.googleapis.com/css2",
    "?family=Dancing+Script:wght@400;700&family=Great+Vibes",
    "&family=Pacifico&family=Satisfy&family=Allura&display=swap",
);

const SIGNATURE_CLASSES: &str = r#"
.signature-cursive { font-family: 'Dancing Script', cursive; }
.signature-elegant { font-family: 'Great Vibes', cursive; }
.signature-casual { font-family: 'Pacifico', cursive; }
.signature-classic { font-family: 'Satisfy', cursive; }
.signature-formal { font-family: 'Allura', cursive; }

@media print {
  .signature-block,
  .signature-section {
    page-break-inside: avoid;
    break-inside: avoid;
  }
}
"#;

/// Builds the stylesheet injected into every rendered document.
///
/// Fonts found in `font_dir` are embedded as base64 data URLs. When none are
/// found the stylesheet imports the hosted families instead, which only works
/// if the browser can reach the network.
pub async fn build_font_css(font_dir: &Path) -> String {
    let mut faces = Vec::with_capacity(SIGNATURE_FONTS.len());

    for font in SIGNATURE_FONTS {
        let path = font_dir.join(font.file);
        match tokio::fs::read(&path).await {
            Ok(bytes) => faces.push(font_face(font.family, &STANDARD.encode(bytes))),
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!(
                    event_name = "pdf.fonts.missing",
                    path = %path.display(),
                    "font not present"
                );
            }
            Err(error) => {
                warn!(
                    event_name = "pdf.fonts.unreadable",
                    path = %path.display(),
                    error = %error,
                    "skipping unreadable font file"
                );
            }
        }
    }

    let mut css = String::new();
    if faces.is_empty() {
        css.push_str(&format!("@import url('{FALLBACK_STYLESHEET}');\n"));
    } else {
        for face in &faces {
            css.push_str(face);
        }
    }
    css.push_str(SIGNATURE_CLASSES);
    css
}

fn font_face(family: &str, encoded: &str) -> String {
    format!(
        "@font-face {{
  font-family: '{family}';
  src: url(data:font/woff2;base64,{encoded}) format('woff2');
  font-weight: normal;
  font-style: normal;
  font-display: block;
}}
"
    )
}
