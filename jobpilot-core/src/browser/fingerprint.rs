use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::page::Page;

use crate::config::FingerprintSection;

use super::error::{BrowserError, BrowserResult};

/// Init scripts that rewrite fingerprintable browser APIs. They only take
/// effect when registered before the first navigation.
#[derive(Debug, Clone)]
pub struct FingerprintMasker {
    config: FingerprintSection,
}

impl FingerprintMasker {
    pub fn new(config: FingerprintSection) -> Self {
        Self { config }
    }

    pub fn scripts(&self) -> Vec<String> {
        let mut scripts = Vec::new();
        if self.config.hide_webdriver {
            scripts.push(self.webdriver_script());
        }
        if self.config.enable_canvas_noise {
            scripts.push(self.canvas_script());
        }
        if self.config.enable_webgl_mask {
            scripts.push(self.webgl_script());
        }
        scripts
    }

    pub async fn apply(&self, page: &Page) -> BrowserResult<()> {
        for source in self.scripts() {
            page.evaluate_on_new_document(
                AddScriptToEvaluateOnNewDocumentParams::builder()
                    .source(source)
                    .build()
                    .map_err(BrowserError::Configuration)?,
            )
            .await?;
        }
        Ok(())
    }

    fn webdriver_script(&self) -> String {
        r#"
            (() => {
                Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
            })();
        "#
        .to_string()
    }

    fn canvas_script(&self) -> String {
        let [min, max] = self.config.canvas_noise_range;
        let (min, max) = (min.min(max), min.max(max));
        format!(
            r#"
            (() => {{
                const randomInt = (min, max) => Math.floor(Math.random() * (max - min + 1)) + min;
                const originalToDataURL = HTMLCanvasElement.prototype.toDataURL;
                HTMLCanvasElement.prototype.toDataURL = function() {{
                    try {{
                        const ctx = this.getContext('2d');
                        if (ctx && this.width > 0 && this.height > 0) {{
                            const imageData = ctx.getImageData(0, 0, this.width, this.height);
                            for (let i = 0; i < imageData.data.length; i += 4) {{
                                const delta = randomInt({min}, {max});
                                imageData.data[i] = Math.min(255, Math.max(0, imageData.data[i] + delta));
                            }}
                            ctx.putImageData(imageData, 0, 0);
                        }}
                    }} catch (_) {{}}
                    return originalToDataURL.apply(this, arguments);
                }};
            }})();
            "#
        )
    }

    fn webgl_script(&self) -> String {
        let vendor = js_string(self.config.webgl_vendor.as_deref().unwrap_or("Intel Inc."));
        let renderer = js_string(
            self.config
                .webgl_renderer
                .as_deref()
                .unwrap_or("Intel Iris OpenGL Engine"),
        );
        format!(
            r#"
            (() => {{
                const spoof = (proto) => {{
                    if (!proto || !proto.getParameter) {{
                        return;
                    }}
                    const original = proto.getParameter;
                    proto.getParameter = function(param) {{
                        if (param === 37445) {{
                            return {vendor};
                        }}
                        if (param === 37446) {{
                            return {renderer};
                        }}
                        return original.apply(this, arguments);
                    }};
                }};
                spoof(window.WebGLRenderingContext && WebGLRenderingContext.prototype);
                spoof(window.WebGL2RenderingContext && WebGL2RenderingContext.prototype);
            }})();
            "#
        )
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_follow_toggles() {
        let masker = FingerprintMasker::new(FingerprintSection::default());
        let scripts = masker.scripts();
        assert_eq!(scripts.len(), 3);
        assert!(scripts[0].contains("'webdriver'"));
        assert!(scripts[1].contains("randomInt(-2, 2)"));
        assert!(scripts[2].contains("37445"));
        assert!(scripts[2].contains("\"Intel Inc.\""));

        let masker = FingerprintMasker::new(FingerprintSection {
            enable_canvas_noise: false,
            enable_webgl_mask: false,
            ..FingerprintSection::default()
        });
        assert_eq!(masker.scripts().len(), 1);
    }

    #[test]
    fn vendor_strings_are_escaped() {
        let masker = FingerprintMasker::new(FingerprintSection {
            webgl_vendor: Some("Vendor's \"GPU\"".into()),
            ..FingerprintSection::default()
        });
        let script = masker.webgl_script();
        assert!(script.contains(r#""Vendor's \"GPU\"""#));
    }
}
