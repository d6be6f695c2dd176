//! The Bambu MQTT client.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::{
    command::Command,
    message::{Message, Print, PushStatus},
    parser::parse_message,
    sequence_id::SequenceId,
};

const MQTT_PORT: u16 = 8883;
const MAX_PACKET_SIZE: usize = 1024 * 1024;
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);
const RESPONSE_POLL: Duration = Duration::from_millis(250);

/// The Bambu MQTT client. Clones share one connection.
#[derive(Clone)]
pub struct Client {
    /// The IP address of the MQTT host.
    pub ip: String,
    /// The access code.
    pub access_code: String,
    /// The serial number.
    pub serial: String,

    topic_device_request: String,
    topic_device_report: String,

    client: rumqttc::AsyncClient,
    event_loop: Arc<Mutex<rumqttc::EventLoop>>,

    responses: Arc<Responses>,
    connected: Arc<AtomicBool>,
}

impl Client {
    /// Creates a new Bambu printer MQTT client. Nothing touches the network
    /// until [`Client::run`] is polled.
    pub fn new<S: Into<String>>(ip: S, access_code: S, serial: S) -> Result<Self> {
        let access_code = access_code.into();
        let ip = ip.into();
        let serial = serial.into();

        let opts = Self::get_config(&ip, &access_code);
        let (client, event_loop) = rumqttc::AsyncClient::new(opts, 25);

        Ok(Self {
            ip,
            access_code,
            topic_device_request: format!("device/{}/request", &serial),
            topic_device_report: format!("device/{}/report", &serial),
            serial,
            client,
            event_loop: Arc::new(Mutex::new(event_loop)),
            responses: Arc::new(Responses::default()),
            connected: Arc::new(AtomicBool::new(false)),
        })
    }

    fn get_config(ip: &str, access_code: &str) -> rumqttc::MqttOptions {
        let client_id = format!("bambu-bridge-{}", nanoid::nanoid!(8));

        let mut opts = rumqttc::MqttOptions::new(client_id, ip, MQTT_PORT);
        opts.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
        opts.set_keep_alive(Duration::from_secs(5));
        opts.set_credentials(crate::LAN_USERNAME, access_code);
        opts.set_transport(rumqttc::Transport::Tls(rumqttc::TlsConfiguration::Rustls(
            crate::tls_config(),
        )));

        opts
    }

    /// Whether the broker has acknowledged our connection and it has not
    /// dropped since.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Polls one event from the MQTT event loop. Polling keeps the
    /// connection alive, and rumqttc reconnects on the poll after an error.
    async fn poll(&self) {
        let event = {
            let mut ep = self.event_loop.lock().await;
            ep.poll().await
        };

        match event {
            Ok(event) => {
                if let rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_)) = &event {
                    tracing::info!(ip = self.ip, serial = self.serial, "mqtt connected");
                    self.connected.store(true, Ordering::Release);
                }
                self.responses.record(parse_message(&event));
            }
            Err(err) => {
                if self.connected.swap(false, Ordering::AcqRel) {
                    tracing::warn!(error = format!("{:?}", err), ip = self.ip, "mqtt connection lost");
                } else {
                    tracing::debug!(error = format!("{:?}", err), ip = self.ip, "mqtt connect attempt failed");
                }
                tokio::time::sleep(RECONNECT_BACKOFF).await;
            }
        }
    }

    /// Get the latest status of the printer.
    pub fn get_status(&self) -> Option<PushStatus> {
        self.responses.status()
    }

    /// Runs the Bambu MQTT client until the task is dropped.
    /// You should run this in a tokio task.
    ///
    /// # Errors
    ///
    /// Returns an error if the report subscription could not be queued.
    pub async fn run(&self) -> Result<()> {
        self.client
            .subscribe(&self.topic_device_report, rumqttc::mqttbytes::QoS::AtMostOnce)
            .await?;
        self.send(&Command::push_all()).await?;

        loop {
            self.poll().await;
        }
    }

    /// Queue a command without waiting for the printer to answer.
    pub async fn send(&self, command: &Command) -> Result<()> {
        let payload = serde_json::to_string(command)?;

        self.client
            .publish(
                &self.topic_device_request,
                rumqttc::mqttbytes::QoS::AtMostOnce,
                false,
                payload,
            )
            .await?;

        Ok(())
    }

    /// Publishes a command and waits for the matching response.
    ///
    /// # Errors
    ///
    /// Returns an error if publishing failed, no response arrived in time, or
    /// the printer answered with a failure result.
    pub async fn publish(&self, command: Command) -> Result<Message> {
        let sequence_id = normalize(command.sequence_id().clone());
        self.send(&command).await?;

        let response = tokio::time::timeout(RESPONSE_TIMEOUT, async {
            loop {
                if let Some(response) = self.responses.take(&sequence_id) {
                    return response;
                }
                tokio::time::sleep(RESPONSE_POLL).await;
            }
        })
        .await
        .map_err(|_| anyhow::anyhow!("timeout waiting for response to command: {:?}", command))?;

        if let Message::Print(print) = &response {
            if print.is_rejected() {
                anyhow::bail!("printer rejected command: {:?}", print);
            }
        }

        Ok(response)
    }

    /// Close the MQTT session.
    pub async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::Release);
        self.client.disconnect().await?;
        Ok(())
    }
}

/// Messages received from the printer, keyed by sequence id. Status pushes
/// are folded into one entry.
#[derive(Default)]
struct Responses(DashMap<SequenceId, Message>);

impl Responses {
    fn record(&self, message: Message) {
        if let Message::Print(Print::PushStatus(status)) = message {
            match self.0.get_mut(&SequenceId::status()) {
                Some(mut entry) => {
                    if let Message::Print(Print::PushStatus(current)) = entry.value_mut() {
                        current.merge(status);
                    }
                }
                None => {
                    self.0
                        .insert(SequenceId::status(), Message::Print(Print::PushStatus(status)));
                }
            }
            return;
        }

        match message.sequence_id() {
            Some(sequence_id) => {
                self.0.insert(normalize(sequence_id), message);
            }
            None => {
                if let Message::Json(value) = &message {
                    tracing::trace!(message = value.to_string(), "unhandled report");
                }
            }
        }
    }

    fn status(&self) -> Option<PushStatus> {
        let response = self.0.get(&SequenceId::status())?;
        match response.value() {
            Message::Print(Print::PushStatus(status)) => Some(status.clone()),
            _ => None,
        }
    }

    fn take(&self, sequence_id: &SequenceId) -> Option<Message> {
        self.0.remove(sequence_id).map(|(_, message)| message)
    }
}

fn normalize(sequence_id: SequenceId) -> SequenceId {
    match sequence_id.as_u32() {
        Ok(id) => SequenceId::Integer(id),
        Err(_) => sequence_id,
    }
}
