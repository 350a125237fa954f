use kube::api::DynamicObject;
use minijinja::Environment;
use serde::Deserialize;
use std::path::Path;

use crate::util::{Error, mergeconcat};

fn invalid_op(e: impl std::fmt::Display) -> minijinja::Error {
    minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, e.to_string())
}

/// Renders named YAML templates into sequences of cluster objects.
///
/// Templates live in a directory supplied at startup; each benchmark kind
/// names the template that produces its resources. The rendered text is a
/// multi-document YAML stream.
pub struct Loader {
    env: Environment<'static>,
}

impl Loader {
    pub fn new(dir: &Path) -> Self {
        let mut loader = Loader::empty();
        loader.env.set_loader(minijinja::path_loader(dir.to_path_buf()));
        loader
    }

    /// A loader with no backing directory. Templates are added explicitly.
    pub fn empty() -> Self {
        let mut env = Environment::new();
        env.add_filter("toyaml", |value: minijinja::Value| {
            serde_yaml::to_string(&value).map_err(invalid_op)
        });
        env.add_filter("fromyaml", |value: &str| {
            serde_yaml::from_str::<serde_json::Value>(value)
                .map(|parsed| minijinja::Value::from_serialize(&parsed))
                .map_err(invalid_op)
        });
        env.add_filter(
            "mergeconcat",
            |defaults: minijinja::Value, overrides: minijinja::Value| {
                let defaults = serde_json::to_value(&defaults).map_err(invalid_op)?;
                let overrides = serde_json::to_value(&overrides).map_err(invalid_op)?;
                Ok::<_, minijinja::Error>(minijinja::Value::from_serialize(&mergeconcat(
                    defaults, overrides,
                )))
            },
        );
        Loader { env }
    }

    pub fn add_template(&mut self, name: &str, source: &str) -> Result<(), Error> {
        self.env
            .add_template_owned(name.to_string(), source.to_string())?;
        Ok(())
    }

    pub fn render(&self, template: &str, ctx: minijinja::Value) -> Result<String, Error> {
        Ok(self.env.get_template(template)?.render(ctx)?)
    }

    /// Renders the named template and parses the result as a YAML stream,
    /// returning the non-empty documents in order.
    pub fn render_all(
        &self,
        template: &str,
        ctx: minijinja::Value,
    ) -> Result<Vec<DynamicObject>, Error> {
        let rendered = self.render(template, ctx)?;
        let mut objects = Vec::new();
        for document in serde_yaml::Deserializer::from_str(&rendered) {
            let value = serde_json::Value::deserialize(document)?;
            if value.is_null() {
                continue;
            }
            objects.push(serde_json::from_value(value)?);
        }
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn renders_a_multi_document_stream_in_order() {
        let mut loader = Loader::empty();
        loader
            .add_template(
                "test.yaml.j2",
                "\
apiVersion: v1
kind: Service
metadata:
  name: {{ name }}-server
---
apiVersion: batch.volcano.sh/v1alpha1
kind: Job
metadata:
  name: {{ name }}
",
            )
            .unwrap();
        let objects = loader
            .render_all("test.yaml.j2", context! { name => "bench" })
            .unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].types.as_ref().unwrap().kind, "Service");
        assert_eq!(objects[1].types.as_ref().unwrap().kind, "Job");
        assert_eq!(objects[1].metadata.name.as_deref(), Some("bench"));
    }

    #[test]
    fn empty_documents_are_dropped() {
        let mut loader = Loader::empty();
        loader
            .add_template(
                "test.yaml.j2",
                "{% if false %}\napiVersion: v1\nkind: Service\n{% endif %}\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm\n",
            )
            .unwrap();
        let objects = loader
            .render_all("test.yaml.j2", context! {})
            .unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].types.as_ref().unwrap().kind, "ConfigMap");
    }

    #[test]
    fn mergeconcat_filter_merges_mappings() {
        let mut loader = Loader::empty();
        loader
            .add_template(
                "merge.j2",
                "{{ ({'a': 1, 'b': {'c': 2}} | mergeconcat({'b': {'d': 3}}))['b']['d'] }}",
            )
            .unwrap();
        let rendered = loader.render("merge.j2", context! {}).unwrap();
        assert_eq!(rendered, "3");
    }
}
