use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use minijinja::{AutoEscape, Environment, UndefinedBehavior, context};
use tracing::warn;

/// Renders `template` against an object's metadata.
///
/// Available variables: `name`, `namespace`, `labels`, `annotations`.
/// Output is never HTML-escaped.
pub fn render(template: &str, meta: &ObjectMeta) -> Result<String, minijinja::Error> {
    if !template.contains("{{") && !template.contains("{%") {
        return Ok(template.to_string());
    }
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.set_keep_trailing_newline(true);
    env.render_str(
        template,
        context! {
            name => meta.name.clone().unwrap_or_default(),
            namespace => meta.namespace.clone().unwrap_or_default(),
            labels => meta.labels.clone().unwrap_or_default(),
            annotations => meta.annotations.clone().unwrap_or_default(),
        },
    )
}

/// Renders every value of a config map. A value that fails to render is
/// logged and kept verbatim.
pub fn render_config(
    data: &BTreeMap<String, String>,
    meta: &ObjectMeta,
) -> BTreeMap<String, String> {
    data.iter()
        .map(|(key, raw)| {
            let value = render(raw, meta).unwrap_or_else(|e| {
                warn!(%key, error = %e, "config value template failed; keeping raw value");
                raw.clone()
            });
            (key.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> ObjectMeta {
        ObjectMeta {
            name: Some("demo".into()),
            namespace: Some("shop".into()),
            labels: Some([("tier".to_string(), "web".to_string())].into()),
            ..Default::default()
        }
    }

    #[test]
    fn renders_metadata_placeholders() {
        assert_eq!(
            render("http://{{ name }}.{{ namespace }}.svc", &meta()).unwrap(),
            "http://demo.shop.svc"
        );
        assert_eq!(render("{{ labels.tier }}", &meta()).unwrap(), "web");
    }

    #[test]
    fn no_html_escaping_and_newlines_kept() {
        assert_eq!(
            render("a<b>&{{ name }}\n", &meta()).unwrap(),
            "a<b>&demo\n"
        );
        assert_eq!(render("plain <text> & more", &meta()).unwrap(), "plain <text> & more");
    }

    #[test]
    fn undefined_variable_is_error() {
        assert!(render("{{ nope }}", &meta()).is_err());
    }

    #[test]
    fn config_keeps_raw_value_on_failure() {
        let data: BTreeMap<String, String> = [
            ("URL".to_string(), "{{ name }}:80".to_string()),
            ("BAD".to_string(), "{{ missing.field }}".to_string()),
        ]
        .into();
        let out = render_config(&data, &meta());
        assert_eq!(out["URL"], "demo:80");
        assert_eq!(out["BAD"], "{{ missing.field }}");
    }
}
