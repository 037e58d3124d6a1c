fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread().enable_all().build()
}

pub mod entities {
    use crate::entity::{self, DeviceInfo, Entity, StateValue};
    use crate::{config, connection, coordinator, output};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    /// Connect to the controller and list the entities it exposes.
    #[derive(clap::Parser)]
    pub struct Args {
        #[clap(flatten)]
        connection: connection::Args,
        #[clap(flatten)]
        config: config::Args,
        #[clap(flatten)]
        output: output::Args,
        /// Also list the generic device points, which are hidden by default.
        #[arg(long)]
        all: bool,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not start the async runtime")]
        Runtime(#[source] std::io::Error),
        #[error("could not connect to the controller")]
        Connect(#[source] connection::Error),
        #[error("could not read the initial controller state")]
        FirstRefresh(#[source] coordinator::Error),
        #[error("could not discover the controller entities")]
        Discover(#[source] entity::DiscoveryError),
        #[error("could not output the entity list")]
        Output(#[source] output::Error),
    }

    #[derive(serde::Serialize)]
    struct EntityRecord {
        unique_id: String,
        kind: &'static str,
        name: String,
        device: DeviceInfo,
        hidden: bool,
        state: BTreeMap<&'static str, StateValue>,
        attributes: Option<serde_json::Value>,
    }

    impl EntityRecord {
        fn new(entity: &dyn Entity) -> Self {
            let state = entity
                .attributes()
                .into_iter()
                .filter(|a| a.retained)
                .filter_map(|a| Some((a.id, entity.state(a.id)?)))
                .collect();
            Self {
                unique_id: entity.unique_id(),
                kind: entity.kind().into(),
                name: entity.name(),
                device: entity.device(),
                hidden: entity.hidden_by_default(),
                state,
                attributes: entity.extra_state_attributes(),
            }
        }
    }

    impl output::Record for EntityRecord {
        const COLUMNS: &'static [&'static str] = &["Unique ID", "Kind", "Name", "Device", "State"];

        fn cells(&self) -> Vec<String> {
            let state = self
                .state
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(" ");
            vec![
                self.unique_id.clone(),
                self.kind.to_string(),
                self.name.clone(),
                self.device.name.clone().unwrap_or_else(|| self.device.identifier.clone()),
                state,
            ]
        }
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let runtime = super::runtime().map_err(Error::Runtime)?;
        runtime.block_on(async {
            let controller = args.connection.connect().await.map_err(Error::Connect)?;
            let coordinator = coordinator::Coordinator::new(
                Arc::clone(&controller),
                args.config.coordinator(),
            );
            let snapshot = coordinator.first_refresh().await.map_err(Error::FirstRefresh)?;
            let entities = entity::discover_from(controller, &snapshot, &args.config.entry())
                .await
                .map_err(Error::Discover)?;
            let mut output = args.output.to_output::<EntityRecord>().map_err(Error::Output)?;
            for entity in &entities {
                if entity.hidden_by_default() && !args.all {
                    continue;
                }
                output.write(&EntityRecord::new(&**entity)).map_err(Error::Output)?;
            }
            output.commit().map_err(Error::Output)
        })
    }
}

pub mod homie {
    use crate::homie::{self, IqtecDevice};
    use crate::{config, connection, coordinator, entity};
    use homie5::{Homie5DeviceProtocol, HomieDomain, HomieID};
    use std::sync::Arc;

    /// Run the bridge, exposing the controller as a Homie device over MQTT.
    #[derive(clap::Parser)]
    pub struct Args {
        #[clap(flatten)]
        connection: connection::Args,
        #[clap(flatten)]
        config: config::Args,
        #[arg(long)]
        mqtt_host: String,
        #[arg(long, default_value = "1883")]
        mqtt_port: u16,
        #[arg(long, default_value = "iqtec-bridge")]
        mqtt_client_id: String,
        /// The Homie device ID to publish the controller under.
        #[arg(long, default_value = "iqtec")]
        device_id: String,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum Error {
        #[error("could not start the async runtime")]
        Runtime(#[source] std::io::Error),
        #[error("`{0}` is not a valid Homie device ID")]
        DeviceId(String, #[source] Box<dyn std::error::Error + Send + Sync>),
        #[error("could not connect to the controller")]
        Connect(#[source] connection::Error),
        #[error("could not read the initial controller state")]
        FirstRefresh(#[source] coordinator::Error),
        #[error("could not discover the controller entities")]
        Discover(#[source] entity::DiscoveryError),
        #[error("Homie device failed")]
        Homie(#[source] homie::Error),
    }

    pub fn run(args: Args) -> Result<(), Error> {
        let device_id = HomieID::try_from(args.device_id.clone())
            .map_err(|e| Error::DeviceId(args.device_id.clone(), Box::new(e)))?;
        let runtime = super::runtime().map_err(Error::Runtime)?;
        runtime.block_on(async {
            let controller = args.connection.connect().await.map_err(Error::Connect)?;
            let coordinator = Arc::new(coordinator::Coordinator::new(
                Arc::clone(&controller),
                args.config.coordinator(),
            ));
            let snapshot = coordinator.first_refresh().await.map_err(Error::FirstRefresh)?;
            let entities = entity::discover_from(controller, &snapshot, &args.config.entry())
                .await
                .map_err(Error::Discover)?;

            let (protocol, last_will) = Homie5DeviceProtocol::new(device_id, HomieDomain::Default);
            let mut options = rumqttc::v5::MqttOptions::new(
                &args.mqtt_client_id,
                &args.mqtt_host,
                args.mqtt_port,
            );
            options.set_last_will(homie::last_will(last_will));
            let (mqtt, event_loop) = rumqttc::v5::AsyncClient::new(options, 128);
            let (sender, commands) = tokio::sync::mpsc::unbounded_channel();
            let _event_loop = homie::spawn_event_loop(event_loop, sender);
            let _poll = coordinator.spawn();
            tracing::info!(
                host = args.mqtt_host,
                port = args.mqtt_port,
                "starting the Homie device"
            );
            let device = IqtecDevice::new(mqtt, protocol, coordinator, entities, commands)
                .map_err(Error::Homie)?;
            device.run().await.map_err(Error::Homie)
        })
    }
}
