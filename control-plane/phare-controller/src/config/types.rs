use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct ControllerConfig {
    #[envconfig(from = "PHARE_PROFILE", default = "dev")]
    pub profile: String,

    #[envconfig(from = "HTTP_PORT", default = "8088")]
    pub http_port: u16,

    /// Restrict watches to a single namespace; all namespaces when unset.
    /// Env: PHARE_WATCH_NAMESPACE
    #[envconfig(from = "PHARE_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Identity stamped on managed objects (`app.kubernetes.io/created-by`),
    /// used as event reporter and field manager.
    #[envconfig(from = "PHARE_CONTROLLER_ID", default = "phare-controller")]
    pub controller_id: String,

    /// Number of parents reconciled in parallel.
    #[envconfig(from = "PHARE_CONCURRENCY", default = "4")]
    pub concurrency: u16,

    #[envconfig(nested)]
    pub reconcile: ReconcileConfig,

    #[envconfig(nested)]
    pub features: FeaturesConfig,
}

#[derive(Envconfig, Clone, Debug)]
pub struct ReconcileConfig {
    /// Attempts for a single patch when the server reports a conflict.
    /// Env: PHARE_PATCH_RETRY_ATTEMPTS
    #[envconfig(from = "PHARE_PATCH_RETRY_ATTEMPTS", default = "5")]
    pub patch_retry_attempts: u32,
    #[envconfig(from = "PHARE_RESYNC_SECS", default = "600")]
    pub resync_secs: u64,
    #[envconfig(from = "PHARE_ERROR_REQUEUE_SECS", default = "30")]
    pub error_requeue_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            patch_retry_attempts: 5,
            resync_secs: 600,
            error_requeue_secs: 30,
        }
    }
}

#[derive(Envconfig, Clone, Debug, Default)]
pub struct FeaturesConfig {
    /// If Some, env explicitly set; otherwise, profile defaults apply
    #[envconfig(from = "PHARE_FEATURES_GATEWAY_API")]
    pub gateway_api: Option<bool>,
    #[envconfig(from = "PHARE_FEATURES_GKE_POLICIES")]
    pub gke_policies: Option<bool>,
}

impl ControllerConfig {
    /// Apply profile → defaults mapping, while respecting explicit env overrides.
    ///
    /// Rules:
    /// - dev: gateway_api=false, gke_policies=false
    /// - gke: gateway_api=true,  gke_policies=true
    pub fn apply_profile_defaults(mut self) -> Self {
        let (def_gateway, def_gke) = match self.profile.as_str() {
            "gke" | "full" | "prod" | "production" => (true, true),
            _ /* dev */ => (false, false),
        };

        if self.features.gateway_api.is_none() {
            self.features.gateway_api = Some(def_gateway);
        }
        if self.features.gke_policies.is_none() {
            self.features.gke_policies = Some(def_gke);
        }

        self
    }

    /// Label selector matching objects managed by this controller instance.
    pub fn managed_selector(&self) -> String {
        crate::controller::ownership::managed_selector(&self.controller_id)
    }
}
