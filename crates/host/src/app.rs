use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use modkit_dispatch::{DirectorySource, ResourceDispatcher, ResourceSource, install_fallback};
use modkit_metrics::PerformanceRecorder;
use modkit_modules::{CatalogLoader, DiscoveryReport, DylibLoader, HandlerCatalog, ModuleDiscoveryService};
use modkit_primitives::{ApiVersion, Resource};
use modkit_registry::WrapperRegistry;
use tracing::{info, warn};

use crate::cli::{Cli, Command};
use crate::config::HostConfig;

/// Registry, discovery, dispatch and metrics wired together.
pub struct Host {
	config: HostConfig,
	catalog: Arc<HandlerCatalog>,
	discovery: ModuleDiscoveryService,
	dispatcher: ResourceDispatcher,
	recorder: Arc<PerformanceRecorder>,
}

impl Host {
	pub fn new(config: HostConfig) -> Self {
		let recorder = Arc::new(PerformanceRecorder::new(config.metrics));
		let registry = Arc::new(WrapperRegistry::with_observer(Arc::clone(&recorder) as _));
		install_fallback(&registry);
		for module in &config.disabled_modules {
			registry.disable_module(module);
		}

		let catalog = Arc::new(HandlerCatalog::new());
		let discovery = ModuleDiscoveryService::new(Arc::clone(&registry))
			.with_loader(Arc::new(CatalogLoader::new(Arc::clone(&catalog))))
			.with_loader(Arc::new(DylibLoader))
			.with_options(config.discovery.options())
			.with_observer(Arc::clone(&recorder) as _);
		let dispatcher = ResourceDispatcher::with_observer(registry, Arc::clone(&recorder) as _);

		Self {
			config,
			catalog,
			discovery,
			dispatcher,
			recorder,
		}
	}

	pub fn catalog(&self) -> &Arc<HandlerCatalog> {
		&self.catalog
	}

	pub fn recorder(&self) -> &Arc<PerformanceRecorder> {
		&self.recorder
	}

	pub async fn discover(&self) -> DiscoveryReport {
		let report = self.discovery.discover(&self.config.module_paths).await;
		for failure in &report.failures {
			warn!(path = %failure.path.display(), module = ?failure.module, error = %failure.error, "module failed to load");
		}
		for loaded in report.loaded.iter().filter(|m| !m.partial.is_empty()) {
			for partial in &loaded.partial {
				warn!(module = %loaded.id, declared = %partial.declared, reason = %partial.reason, "type skipped");
			}
		}
		info!(%report, "discovery finished");
		report
	}

	fn source(&self, data_dir: Option<PathBuf>) -> anyhow::Result<Arc<dyn ResourceSource>> {
		let Some(root) = data_dir.or_else(|| self.config.data_dir.clone()) else {
			bail!("no data directory: pass --data-dir or set data_dir in the config");
		};
		Ok(Arc::new(DirectorySource::new(root)))
	}

	fn api_version(&self) -> ApiVersion {
		self.config.api_version
	}

	pub async fn execute(&self, command: Command, out: &mut impl Write) -> anyhow::Result<()> {
		match command {
			Command::Discover { json } => {
				let modules = self.discovery.contexts();
				if json {
					serde_json::to_writer_pretty(&mut *out, &modules)?;
					writeln!(out)?;
				} else {
					for module in modules {
						write!(out, "{:<24} {:<10} gen {}", module.id, module.state, module.generation)?;
						if let Some(failure) = &module.failure {
							write!(out, "  {failure}")?;
						}
						writeln!(out)?;
					}
				}
			}
			Command::Types => {
				for known in self.dispatcher.known_types() {
					writeln!(out, "{}  {}  ({})", known.resource_type, known.module, known.handler)?;
				}
				let disabled = self.dispatcher.disabled_modules().to_vec();
				if !disabled.is_empty() {
					writeln!(out, "disabled: {}", disabled.join(", "))?;
				}
			}
			Command::Resolve { key, fallback, data_dir } => {
				let source = self.source(data_dir)?;
				let resource = self
					.dispatcher
					.resolve_resource(self.api_version(), &*source, key, fallback)
					.await
					.with_context(|| format!("resolving {key}"))?;
				describe(out, &*resource)?;
			}
			Command::Create { resource_type } => {
				let resource = self
					.dispatcher
					.create_empty_resource(self.api_version(), resource_type)
					.await
					.with_context(|| format!("creating {resource_type}"))?;
				describe(out, &*resource)?;
			}
			Command::Stats { data_dir } => {
				let source = self.source(data_dir)?;
				let results = self.dispatcher.resolve_all(self.api_version(), source).await?;
				let failed = results.iter().filter(|(_, result)| result.is_err()).count();
				for (key, result) in &results {
					if let Err(err) = result {
						warn!(%key, error = %err, "resolve failed");
					}
				}
				info!(resolved = results.len() - failed, failed, "resolved data directory");
				serde_json::to_writer_pretty(&mut *out, &self.recorder.report())?;
				writeln!(out)?;
			}
		}
		Ok(())
	}

	pub fn shutdown(&self) {
		let unloaded = self.discovery.unload_all();
		info!(unloaded, "modules unloaded");
	}
}

fn describe(out: &mut impl Write, resource: &dyn Resource) -> std::io::Result<()> {
	writeln!(
		out,
		"{} {} api {} ({} bytes)",
		resource.resource_type(),
		resource.wrapper_name(),
		resource.requested_api_version(),
		resource.to_bytes().len()
	)
}

/// Applies command line overrides to `config` and runs `cli.command` to completion.
pub async fn run(cli: Cli, mut config: HostConfig) -> anyhow::Result<()> {
	config.module_paths.extend(cli.module_paths);
	if let Some(version) = cli.api_version {
		config.api_version = ApiVersion(version);
	}

	let host = Host::new(config);
	tracing::debug!(libraries = ?host.catalog().names(), "handler catalog");
	host.discover().await;
	let mut stdout = std::io::stdout().lock();
	let result = host.execute(cli.command, &mut stdout).await;
	host.shutdown();
	tracing::debug!(samples = host.recorder().len(), evicted = host.recorder().evicted(), "recorder");
	result
}

#[cfg(test)]
mod tests {
	use bytes::Bytes;
	use modkit_modules::{FactoryTable, ModuleManifest};
	use modkit_primitives::{NoopObserver, RawResource, ResourceKey, ResourceType};
	use modkit_registry::{FactoryContext, FactoryError, WrapperFactory};
	use pretty_assertions::assert_eq;

	use super::*;

	const MESH: ResourceType = ResourceType(0x0158_2A1B);

	#[derive(Debug)]
	struct Mesh {
		api_version: ApiVersion,
		data: Bytes,
	}

	impl Resource for Mesh {
		fn resource_type(&self) -> ResourceType {
			MESH
		}

		fn requested_api_version(&self) -> ApiVersion {
			self.api_version
		}

		fn recommended_api_version(&self) -> ApiVersion {
			ApiVersion::V1
		}

		fn to_bytes(&self) -> Bytes {
			self.data.clone()
		}

		fn as_any(&self) -> &dyn std::any::Any {
			self
		}

		fn wrapper_name(&self) -> &'static str {
			"mesh"
		}
	}

	struct MeshFactory;

	impl WrapperFactory for MeshFactory {
		fn name(&self) -> &str {
			"mesh"
		}

		fn decode(&self, ctx: FactoryContext, data: Bytes) -> Result<Box<dyn Resource>, FactoryError> {
			if data.is_empty() {
				return Err(FactoryError::Malformed("empty mesh".into()));
			}
			Ok(Box::new(Mesh {
				api_version: ctx.api_version,
				data,
			}))
		}

		fn create_empty(&self, ctx: FactoryContext) -> Result<Box<dyn Resource>, FactoryError> {
			Ok(Box::new(Mesh {
				api_version: ctx.api_version,
				data: Bytes::new(),
			}))
		}
	}

	struct Fixture {
		_dir: tempfile::TempDir,
		host: Host,
		data: PathBuf,
	}

	fn key(instance: u64) -> ResourceKey {
		ResourceKey::new(MESH, 0, instance)
	}

	fn fixture(config: HostConfig) -> Fixture {
		let dir = tempfile::tempdir().unwrap();
		let module = dir.path().join("modules").join("mesh");
		std::fs::create_dir_all(&module).unwrap();
		std::fs::write(
			module.join(ModuleManifest::FILE_NAME),
			format!("id = \"mesh\"\n[loader]\nkind = \"catalog\"\nentry = \"mesh\"\n[[handlers]]\ntypes = [\"{MESH}\"]\n"),
		)
		.unwrap();

		let data = dir.path().join("data");
		std::fs::create_dir_all(&data).unwrap();
		let source = DirectorySource::new(&data);
		std::fs::write(source.path_for(&key(1)), b"verts").unwrap();
		std::fs::write(source.path_for(&key(2)), b"").unwrap();

		let host = Host::new(HostConfig {
			module_paths: vec![dir.path().join("modules")],
			data_dir: Some(data.clone()),
			..config
		});
		host.catalog().insert("mesh", Arc::new(FactoryTable::new().with(MESH, Arc::new(MeshFactory))));
		Fixture { _dir: dir, host, data }
	}

	async fn run_command(host: &Host, command: Command) -> String {
		let mut out = Vec::new();
		host.execute(command, &mut out).await.unwrap();
		String::from_utf8(out).unwrap()
	}

	#[tokio::test]
	async fn discover_then_resolve() {
		let fx = fixture(HostConfig::default());
		let report = fx.host.discover().await;
		assert_eq!(report.loaded_ids(), vec!["mesh"]);

		let listing = run_command(&fx.host, Command::Discover { json: false }).await;
		assert!(listing.starts_with("mesh"), "{listing}");
		assert!(listing.contains("loaded"), "{listing}");

		let types = run_command(&fx.host, Command::Types).await;
		assert_eq!(types, format!("{MESH}  mesh  (mesh)\n"));

		let resolved = run_command(
			&fx.host,
			Command::Resolve {
				key: key(1),
				fallback: false,
				data_dir: None,
			},
		)
		.await;
		assert_eq!(resolved, format!("{MESH} mesh api v1 (5 bytes)\n"));

		let forced = run_command(
			&fx.host,
			Command::Resolve {
				key: key(1),
				fallback: true,
				data_dir: Some(fx.data.clone()),
			},
		)
		.await;
		assert!(forced.starts_with(&format!("{MESH} ")), "{forced}");
		assert!(forced.contains("RawResource api v1 (5 bytes)"), "{forced}");
	}

	#[tokio::test]
	async fn disabled_modules_from_config() {
		let fx = fixture(HostConfig {
			disabled_modules: vec!["mesh".into()],
			..HostConfig::default()
		});
		fx.host.discover().await;
		let types = run_command(&fx.host, Command::Types).await;
		assert_eq!(types, "disabled: mesh\n");
	}

	#[tokio::test]
	async fn missing_key_is_an_error() {
		let fx = fixture(HostConfig::default());
		fx.host.discover().await;
		let mut out = Vec::new();
		let err = fx
			.host
			.execute(
				Command::Resolve {
					key: key(9),
					fallback: false,
					data_dir: None,
				},
				&mut out,
			)
			.await
			.unwrap_err();
		assert!(format!("{err:#}").contains("no record for key"), "{err:#}");
	}

	#[tokio::test]
	async fn stats_reports_resolutions() {
		let fx = fixture(HostConfig::default());
		fx.host.discover().await;
		let output = run_command(&fx.host, Command::Stats { data_dir: None }).await;
		let report: serde_json::Value = serde_json::from_str(&output).unwrap();
		let resolve = &report["operations"][0];
		assert_eq!(resolve["kind"], "resolve");
		assert_eq!(resolve["count"], 2);
		assert_eq!(resolve["success_rate"], 0.5);
		let modules = report["modules"].as_array().unwrap();
		assert!(modules.iter().any(|m| m["module"] == "mesh"), "{modules:?}");
	}

	#[tokio::test]
	async fn recorder_does_not_change_outcomes() {
		let fx = fixture(HostConfig::default());
		fx.host.discover().await;
		let observed = &fx.host.dispatcher;
		let silent = ResourceDispatcher::with_observer(Arc::clone(observed.registry()), Arc::new(NoopObserver));
		let source = DirectorySource::new(&fx.data);

		for instance in [1, 2, 3] {
			for fallback in [false, true] {
				let a = observed.resolve_resource(ApiVersion::V1, &source, key(instance), fallback).await;
				let b = silent.resolve_resource(ApiVersion::V1, &source, key(instance), fallback).await;
				match (a, b) {
					(Ok(a), Ok(b)) => {
						assert_eq!(a.wrapper_name(), b.wrapper_name());
						assert_eq!(a.to_bytes(), b.to_bytes());
						assert_eq!(a.is::<RawResource>(), b.is::<RawResource>());
					}
					(Err(a), Err(b)) => assert_eq!(a.to_string(), b.to_string()),
					(a, b) => panic!("outcomes differ: {a:?} vs {b:?}"),
				}
			}
		}
		assert!(!fx.host.recorder().is_empty());
	}
}
