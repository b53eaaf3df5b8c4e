use std::net::IpAddr;

use async_trait::async_trait;
use aws_sdk_ec2::{
  Client,
  types::{Filter, ResourceType, Tag, TagSpecification},
};
use chrono::Utc;
use drydock_client::entities::server::{Server, ServerSpec};

use crate::{CloudProvider, backoff::with_jittered_backoff};

/// EC2-backed Server Inventory. The fleet's only durable state beyond
/// the provider itself is instance tags — no local cache survives a
/// call (`spec.md` §4.C).
pub struct AwsProvider {
  client: Client,
}

impl AwsProvider {
  pub async fn connect() -> Self {
    let config = aws_config::load_from_env().await;
    Self { client: Client::new(&config) }
  }

  pub fn from_client(client: Client) -> Self {
    Self { client }
  }
}

#[async_trait]
impl CloudProvider for AwsProvider {
  async fn list(&self, filter_tags: &[String]) -> anyhow::Result<Vec<Server>> {
    with_jittered_backoff(|| async {
      let mut filters = vec![Filter::builder()
        .name("instance-state-name")
        .values("running")
        .values("pending")
        .values("stopped")
        .build()];
      for tag in filter_tags {
        let (key, value) = split_tag(tag);
        filters.push(Filter::builder().name(format!("tag:{key}")).values(value).build());
      }
      let resp = self.client.describe_instances().set_filters(Some(filters)).send().await?;
      let mut servers = Vec::new();
      for reservation in resp.reservations() {
        for instance in reservation.instances() {
          servers.push(instance_to_server(instance));
        }
      }
      Ok(servers)
    })
    .await
  }

  async fn set_tags(&self, id: &str, tags: &[String]) -> anyhow::Result<()> {
    with_jittered_backoff(|| async {
      // Replace wholesale: each logical "key:value" tag lives under its own
      // EC2 tag key, so a stale key from a prior call has to be deleted by
      // name, not just overwritten — overwriting would leave dropped keys
      // (e.g. a released lock tag) behind forever.
      let resp = self.client.describe_instances().instance_ids(id).send().await?;
      let existing_keys: Vec<String> = resp
        .reservations()
        .iter()
        .flat_map(|r| r.instances())
        .flat_map(|i| i.tags())
        .filter_map(|t| t.key().map(str::to_string))
        .collect();
      if !existing_keys.is_empty() {
        let delete_tags = existing_keys.iter().map(|k| Tag::builder().key(k).build()).collect::<Vec<_>>();
        self.client.delete_tags().resources(id).set_tags(Some(delete_tags)).send().await.ok();
      }
      let ec2_tags = tags
        .iter()
        .map(|t| {
          let (key, value) = split_tag(t);
          Tag::builder().key(key).value(value).build()
        })
        .collect::<Vec<_>>();
      self.client.create_tags().resources(id).set_tags(Some(ec2_tags)).send().await?;
      Ok(())
    })
    .await
  }

  async fn destroy(&self, id: &str) -> anyhow::Result<()> {
    with_jittered_backoff(|| async {
      self.client.terminate_instances().instance_ids(id).send().await?;
      Ok(())
    })
    .await
  }

  async fn snapshot(&self, id: &str, name: &str) -> anyhow::Result<String> {
    with_jittered_backoff(|| async {
      let resp = self
        .client
        .create_image()
        .instance_id(id)
        .name(format!("{name}-{}", Utc::now().timestamp()))
        .tag_specifications(
          TagSpecification::builder()
            .resource_type(ResourceType::Image)
            .tags(Tag::builder().key("drydock-template").value(name).build())
            .build(),
        )
        .send()
        .await?;
      resp.image_id().map(str::to_string).ok_or_else(|| anyhow::anyhow!("create_image returned no image id"))
    })
    .await
  }

  async fn clone_from_snapshot(&self, snapshot_id: &str, spec: ServerSpec) -> anyhow::Result<Server> {
    with_jittered_backoff(|| async {
      let instance_type = instance_type_for(spec.cpu, spec.memory_mb);
      let tag_spec = TagSpecification::builder()
        .resource_type(ResourceType::Instance)
        .set_tags(Some(
          spec
            .tags
            .iter()
            .map(|t| {
              let (key, value) = split_tag(t);
              Tag::builder().key(key).value(value).build()
            })
            .collect(),
        ))
        .build();
      let resp = self
        .client
        .run_instances()
        .image_id(snapshot_id)
        .instance_type(instance_type)
        .min_count(1)
        .max_count(1)
        .tag_specifications(tag_spec)
        .send()
        .await?;
      let instance = resp
        .instances()
        .first()
        .ok_or_else(|| anyhow::anyhow!("run_instances returned no instance"))?;
      Ok(instance_to_server(instance))
    })
    .await
  }
}

fn instance_to_server(instance: &aws_sdk_ec2::types::Instance) -> Server {
  let tags = instance
    .tags()
    .iter()
    .filter_map(|t| Some(format!("{}:{}", t.key()?, t.value()?)))
    .collect();
  Server {
    id: instance.instance_id().unwrap_or_default().to_string(),
    private_ip: instance
      .private_ip_address()
      .and_then(|ip| ip.parse::<IpAddr>().ok())
      .unwrap_or_else(|| IpAddr::from([0, 0, 0, 0])),
    public_ip: instance.public_ip_address().and_then(|ip| ip.parse().ok()),
    region: instance.placement().and_then(|p| p.availability_zone()).unwrap_or_default().to_string(),
    cpu: instance.cpu_options().and_then(|c| c.core_count()).unwrap_or(1).max(1) as u32,
    memory_mb: 0,
    created_at: instance.launch_time().map(|t| {
      chrono::DateTime::from_timestamp(t.secs(), 0).unwrap_or_else(Utc::now)
    }).unwrap_or_else(Utc::now),
    tags,
  }
}

/// Splits a logical `"key:value"` tag into its EC2 tag key and value.
/// Values may contain further colons (e.g. `deploy_lock:u1_myapp_prod_api`),
/// so only the first separator counts.
fn split_tag(tag: &str) -> (&str, &str) {
  tag.split_once(':').unwrap_or((tag, ""))
}

fn instance_type_for(cpu: u32, memory_mb: u64) -> &'static str {
  match (cpu, memory_mb) {
    (c, _) if c <= 1 => "t3.micro",
    (c, _) if c <= 2 => "t3.small",
    (c, m) if c <= 4 && m <= 8192 => "t3.medium",
    _ => "t3.large",
  }
}
