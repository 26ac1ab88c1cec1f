//! Wires a reader cluster socket, dataframe ingest, a dispatch tap, a runner chain, and a writer
//! cluster socket into one process: the closed loop a frame travels between two peers.

use clap::{App, Arg};
use gdfrunner::config::RunnerConfig;
use gdf_dataframe::{FrameReceiver, FrameSender, GdfRecord, GeoDataFrame, RecordKind, Runner, RunnerChain};
use gdf_dispatch::{Dispatcher, DispatcherWorker, KeyExtractor, Processor};
use gdf_fabric::{directory, SubscriberKind};
use gdf_net::{ClusterConfig, ClusterSocket, ClusterVariant, SocketRole};
use std::time::Duration;

/// An opportunistic tap on the inbound queue: observes every record a real subscriber already
/// has without competing with it for capacity, and logs what passed through.
struct TallyProcessor {
    kind_name: &'static str,
    log: slog::Logger,
}

impl Processor for TallyProcessor {
    fn process(&mut self, record: &GdfRecord, key: u64) -> bool {
        slog::debug!(self.log, "observed record"; "kind" => self.kind_name, "name" => &record.name, "key" => key);
        true
    }

    fn name(&self) -> &str {
        self.kind_name
    }
}

fn main() {
    let matches = App::new("gdfrunner")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Runs one dataframe ingest/emit pipeline between a reader and a writer cluster socket.")
        .arg(
            Arg::with_name("CONFIG")
                .help("Path to a runner TOML configuration file")
                .required(true),
        )
        .get_matches();

    let config_path = matches.value_of("CONFIG").unwrap();
    let config = RunnerConfig::load(config_path);
    let log = gdf_kernel::logging::init(&config.logging);

    slog::info!(log, "starting runner";
        "reader" => &config.net.reader_address,
        "writer" => &config.net.writer_address,
        "inbound_queue" => &config.fabric.inbound_queue,
        "outbound_queue" => &config.fabric.outbound_queue);

    let frame = GeoDataFrame::new("runner");

    let ingest_sub = directory::subscriber(
        &config.fabric.inbound_queue,
        SubscriberKind::Confidence,
        config.fabric.queue_depth,
        0,
    );
    let receiver = FrameReceiver::spawn(
        frame.clone(),
        ingest_sub,
        config.dataframe.channel_count,
        Duration::from_secs(config.dataframe.idle_timeout_secs),
        log.new(slog::o!("component" => "ingest")),
    );

    let tap_sub = directory::subscriber(
        &config.fabric.inbound_queue,
        SubscriberKind::Opportunity,
        config.fabric.queue_depth,
        0,
    );
    let mut tap = Dispatcher::new(tap_sub, log.new(slog::o!("component" => "tap")));
    let tap_kinds: Vec<(RecordKind, &'static str)> =
        vec![(RecordKind::Column, "column"), (RecordKind::Meta, "meta"), (RecordKind::Eof, "eof")];
    for (kind, name) in tap_kinds.iter() {
        tap.register(
            *kind,
            KeyExtractor::Header,
            Box::new(TallyProcessor { kind_name: name, log: log.new(slog::o!("component" => "tap")) }),
        );
    }
    let tap_worker = DispatcherWorker::spawn(tap, Duration::from_millis(200));

    let reader_socket = ClusterSocket::new(
        ClusterConfig {
            address: config.net.reader_address.clone(),
            variant: ClusterVariant::Queue,
            role: SocketRole::Reader,
            queue_name: config.fabric.inbound_queue.clone(),
            depth: config.fabric.queue_depth,
            is_blind: false,
        },
        log.new(slog::o!("component" => "reader_socket")),
    )
    .expect("failed to start reader cluster socket");

    let ingest_timeout =
        Duration::from_secs(config.dataframe.idle_timeout_secs * (config.dataframe.channel_count as u64).max(1) + 5);
    if !frame.wait_ingest_complete(ingest_timeout) {
        slog::error!(log, "ingest did not complete within the configured timeout");
        frame.shutdown();
        return;
    }

    if frame.in_error() {
        slog::error!(log, "dataframe ingest reported an error; shutting down without emitting");
        frame.shutdown();
        return;
    }

    slog::info!(log, "ingest complete"; "rows" => frame.num_rows());

    let outbound_pub = directory::publisher(&config.fabric.outbound_queue, config.fabric.queue_depth);
    let sender = FrameSender::new(outbound_pub, config.dataframe.key_space, gdf_kernel::SYS_TIMEOUT);
    let runners: Vec<Box<dyn Runner>> = vec![Box::new(sender)];
    let chain = RunnerChain::spawn(frame.clone(), runners, log.new(slog::o!("component" => "runner_chain")));

    frame.wait_run_complete(gdf_kernel::SYS_TIMEOUT);

    let writer_socket = ClusterSocket::new(
        ClusterConfig {
            address: config.net.writer_address.clone(),
            variant: ClusterVariant::Queue,
            role: SocketRole::Writer,
            queue_name: config.fabric.outbound_queue.clone(),
            depth: config.fabric.queue_depth,
            is_blind: config.net.is_blind,
        },
        log.new(slog::o!("component" => "writer_socket")),
    )
    .expect("failed to start writer cluster socket");

    // Give a connecting peer a window to drain the emitted frame off the wire before teardown.
    std::thread::sleep(Duration::from_secs(2));

    slog::info!(log, "runner shutting down");
    drop(chain);
    drop(tap_worker);
    drop(receiver);
    drop(reader_socket);
    drop(writer_socket);
}
