// nfviz/src/config.rs

//! `RunConfig`: the immutable description of the current run (project,
//! region, bucket, ...) handed to every component at construction.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
  pub project_id: String,
  pub region: String,
  /// Zone of the managed notebook environment.
  pub zone: String,
  pub bucket_name: String,
  pub service_account_name: String,
  pub notebook_name: String,
  /// External batch jobs whose name starts with this belong to the pipeline.
  pub job_prefix: String,
  /// Object prefix of the pipeline work directory inside the bucket.
  pub work_prefix: String,
}

impl RunConfig {
  /// Builds a config with every other field derived from the project and
  /// region the same way the provisioning steps expect them.
  pub fn new(project_id: impl Into<String>, region: impl Into<String>) -> Self {
    let project_id = project_id.into();
    let region = region.into();
    Self {
      bucket_name: format!("{project_id}-bucket"),
      zone: format!("{region}-a"),
      service_account_name: "nextflow-pipeline-sa".to_string(),
      notebook_name: "nextflow-workbench".to_string(),
      job_prefix: "nf-".to_string(),
      work_prefix: "scratch".to_string(),
      project_id,
      region,
    }
  }

  pub fn with_bucket(mut self, bucket_name: impl Into<String>) -> Self {
    self.bucket_name = bucket_name.into();
    self
  }

  pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
    self.zone = zone.into();
    self
  }

  pub fn with_service_account(mut self, name: impl Into<String>) -> Self {
    self.service_account_name = name.into();
    self
  }

  pub fn with_notebook(mut self, name: impl Into<String>) -> Self {
    self.notebook_name = name.into();
    self
  }

  pub fn service_account_email(&self) -> String {
    format!("{}@{}.iam.gserviceaccount.com", self.service_account_name, self.project_id)
  }

  /// Parent scope of the batch job listing.
  pub fn batch_parent(&self) -> String {
    format!("projects/{}/locations/{}", self.project_id, self.region)
  }

  /// Parent scope of the notebook instance and its operations.
  pub fn notebook_parent(&self) -> String {
    format!("projects/{}/locations/{}", self.project_id, self.zone)
  }

  pub fn notebook_instance_path(&self) -> String {
    format!("{}/instances/{}", self.notebook_parent(), self.notebook_name)
  }

  pub fn network_path(&self, network: &str) -> String {
    format!("projects/{}/global/networks/{}", self.project_id, network)
  }

  pub fn subnetwork_path(&self, subnetwork: &str) -> String {
    format!(
      "projects/{}/regions/{}/subnetworks/{}",
      self.project_id, self.region, subnetwork
    )
  }

  /// `gs://` URL of the pipeline work directory.
  pub fn work_dir_url(&self) -> String {
    format!("gs://{}/{}", self.bucket_name, self.work_prefix)
  }
}
