/// Rancher API version path segment
pub const API_PREFIX: &str = "/v2-beta";

/// Envelope `type` value marking an upstream error
pub const ERROR_ENVELOPE_TYPE: &str = "error";

/// Launch label opting a service into discovery; its value is the scrape path
pub const ENDPOINT_LABEL: &str = "prometheus.endpoint";

/// Namespace of launch labels propagated to the published targets
pub const LABELS_PREFIX: &str = "prometheus.labels.";

/// Reserved label keys, always set from discovery data
pub const LABEL_HOSTNAME: &str = "hostname";
pub const LABEL_STACK: &str = "stack";
pub const LABEL_SERVICE: &str = "service";
