use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;

const DEFAULT_HOSTS: &str = "127.0.0.1  localhost
::1        localhost ip6-localhost ip6-loopback";

/// Command line / environment configuration for the operator.
#[derive(Parser, Debug, Clone)]
#[command(name = "perftest-operator", about = "Kubernetes operator for networked performance benchmarks")]
pub struct Args {
    /// The API group of the benchmark CRDs
    #[arg(long, env = "KUBE_PERFTEST_API_GROUP", default_value = "perftest.stackhpc.com")]
    pub api_group: String,

    /// Comma-separated list of categories to place the CRDs into
    #[arg(long, env = "KUBE_PERFTEST_CRD_CATEGORIES", value_delimiter = ',', default_value = "perftest")]
    pub crd_categories: Vec<String>,

    /// The field manager name to use for server-side apply
    #[arg(long, env = "KUBE_PERFTEST_FIELD_MANAGER", default_value = "kube-perftest-operator")]
    pub field_manager: String,

    /// The default image prefix to use for benchmark images
    #[arg(long, env = "KUBE_PERFTEST_DEFAULT_IMAGE_PREFIX", default_value = "ghcr.io/stackhpc/kube-perftest-")]
    pub default_image_prefix: String,

    /// The default tag to use for benchmark images
    #[arg(long, env = "KUBE_PERFTEST_DEFAULT_IMAGE_TAG", default_value = "latest")]
    pub default_image_tag: String,

    /// The image pull policy to use for benchmarks
    #[arg(long, env = "KUBE_PERFTEST_DEFAULT_IMAGE_PULL_POLICY", default_value = "IfNotPresent")]
    pub default_image_pull_policy: String,

    /// The name of the scheduler to use for benchmark pods
    ///
    /// Pod preemption appears to be at best difficult to configure in the
    /// Volcano scheduler, so the default scheduler is used. Pods still get
    /// scheduled simultaneously because of the priority class preemption,
    /// and we benefit from Volcano's handling of job events.
    #[arg(long, env = "KUBE_PERFTEST_SCHEDULER_NAME", default_value = "default-scheduler")]
    pub scheduler_name: String,

    /// The name of the Volcano queue to use
    #[arg(long, env = "KUBE_PERFTEST_QUEUE_NAME", default_value = "default")]
    pub queue_name: String,

    /// Label specifying the kind of the benchmark that a resource belongs to
    #[arg(long, env = "KUBE_PERFTEST_KIND_LABEL")]
    pub kind_label: Option<String>,

    /// Label specifying the namespace of the benchmark that a resource belongs to
    #[arg(long, env = "KUBE_PERFTEST_NAMESPACE_LABEL")]
    pub namespace_label: Option<String>,

    /// Label specifying the name of the benchmark that a resource belongs to
    #[arg(long, env = "KUBE_PERFTEST_NAME_LABEL")]
    pub name_label: Option<String>,

    /// Label specifying the component of the benchmark that a resource belongs to
    #[arg(long, env = "KUBE_PERFTEST_COMPONENT_LABEL")]
    pub component_label: Option<String>,

    /// Label indicating that a configmap should be populated with hosts from a service
    #[arg(long, env = "KUBE_PERFTEST_HOSTS_FROM_LABEL")]
    pub hosts_from_label: Option<String>,

    /// The default hosts for the generated hosts files
    #[arg(long, env = "KUBE_PERFTEST_DEFAULT_HOSTS", default_value = DEFAULT_HOSTS)]
    pub default_hosts: String,

    /// The default priority when there are no existing priority classes
    ///
    /// Negative by default so that benchmark jobs never preempt other pods.
    #[arg(long, env = "KUBE_PERFTEST_INITIAL_PRIORITY", default_value_t = -1, allow_hyphen_values = true)]
    pub initial_priority: i32,

    /// The prefix to use for generating resource names
    #[arg(long, env = "KUBE_PERFTEST_RESOURCE_PREFIX", default_value = "kube-perftest-")]
    pub resource_prefix: String,

    /// The directory containing the benchmark resource templates
    #[arg(long, env = "KUBE_PERFTEST_TEMPLATES_DIR", default_value = "/etc/kube-perftest/templates")]
    pub templates_dir: PathBuf,

    /// The port to serve metrics and health endpoints on
    #[arg(long, env = "KUBE_PERFTEST_METRICS_PORT", default_value_t = 8080)]
    pub metrics_port: u16,
}

/// Fully resolved operator settings.
///
/// Label and annotation names that were not configured explicitly are
/// derived from the API group.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_group: String,
    pub crd_categories: Vec<String>,
    pub field_manager: String,
    pub default_image_prefix: String,
    pub default_image_tag: String,
    pub default_image_pull_policy: String,
    pub scheduler_name: String,
    pub queue_name: String,
    pub kind_label: String,
    pub namespace_label: String,
    pub name_label: String,
    pub component_label: String,
    pub hosts_from_label: String,
    pub default_hosts: String,
    pub initial_priority: i32,
    pub resource_prefix: String,
    pub templates_dir: PathBuf,
    pub metrics_port: u16,
    pub finalizer: String,
    pub last_handled_annotation: String,
    pub progress_annotation: String,
    pub hosts_available_annotation: String,
}

impl From<Args> for Settings {
    fn from(args: Args) -> Self {
        let group = args.api_group.clone();
        Settings {
            kind_label: args
                .kind_label
                .unwrap_or_else(|| format!("{group}/benchmark-kind")),
            namespace_label: args
                .namespace_label
                .unwrap_or_else(|| format!("{group}/benchmark-namespace")),
            name_label: args
                .name_label
                .unwrap_or_else(|| format!("{group}/benchmark-name")),
            component_label: args
                .component_label
                .unwrap_or_else(|| format!("{group}/benchmark-component")),
            hosts_from_label: args
                .hosts_from_label
                .unwrap_or_else(|| format!("{group}/hosts-from")),
            finalizer: format!("{group}/finalizer"),
            last_handled_annotation: format!("{group}/last-handled-configuration"),
            progress_annotation: format!("{group}/progress"),
            hosts_available_annotation: format!("{group}/hosts-available"),
            api_group: args.api_group,
            crd_categories: args.crd_categories,
            field_manager: args.field_manager,
            default_image_prefix: args.default_image_prefix,
            default_image_tag: args.default_image_tag,
            default_image_pull_policy: args.default_image_pull_policy,
            scheduler_name: args.scheduler_name,
            queue_name: args.queue_name,
            default_hosts: args.default_hosts,
            initial_priority: args.initial_priority,
            resource_prefix: args.resource_prefix,
            templates_dir: args.templates_dir,
            metrics_port: args.metrics_port,
        }
    }
}

impl Settings {
    /// The default image for the named benchmark tool.
    pub fn image(&self, name: &str) -> String {
        format!(
            "{}{}:{}",
            self.default_image_prefix, name, self.default_image_tag
        )
    }

    /// The labels that mark a resource as belonging to the given benchmark.
    pub fn benchmark_labels(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> BTreeMap<String, String> {
        BTreeMap::from([
            (self.kind_label.clone(), kind.to_string()),
            (self.namespace_label.clone(), namespace.to_string()),
            (self.name_label.clone(), name.to_string()),
        ])
    }

    /// A label selector matching resources that belong to the given benchmark.
    pub fn benchmark_selector(&self, kind: &str, namespace: &str, name: &str) -> String {
        self.benchmark_labels(kind, namespace, name)
            .into_iter()
            .map(|(label, value)| format!("{label}={value}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
pub fn test_settings() -> Settings {
    use clap::Parser;
    Settings::from(Args::parse_from(["perftest-operator"]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_default_from_api_group() {
        let settings = test_settings();
        assert_eq!(settings.kind_label, "perftest.stackhpc.com/benchmark-kind");
        assert_eq!(
            settings.hosts_from_label,
            "perftest.stackhpc.com/hosts-from"
        );
        assert_eq!(settings.finalizer, "perftest.stackhpc.com/finalizer");
    }

    #[test]
    fn selector_contains_all_three_labels() {
        let settings = test_settings();
        let selector = settings.benchmark_selector("IPerf", "default", "test");
        assert!(selector.contains("perftest.stackhpc.com/benchmark-kind=IPerf"));
        assert!(selector.contains("perftest.stackhpc.com/benchmark-namespace=default"));
        assert!(selector.contains("perftest.stackhpc.com/benchmark-name=test"));
    }

    #[test]
    fn image_uses_prefix_and_tag() {
        let settings = test_settings();
        assert_eq!(
            settings.image("iperf"),
            "ghcr.io/stackhpc/kube-perftest-iperf:latest"
        );
    }
}
