mod common;
use common::*;
use phocus_bridge::prelude::*;
use phocus_bridge::transport::StreamTransport;

use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[tokio::test]
async fn dead_line_closes_transport_before_anything_else() {
    // nothing scripted: the first read comes back empty
    let h = Harness::new(MockTransport::new());
    let queue = WorkQueue::new(10);
    queue.enqueue(Factory::queued("QPGS1")).unwrap();
    queue.enqueue(Factory::queued("QPGS2")).unwrap();

    let coordinator = Coordinator::new(queue.clone(), h.dispatcher.clone(), Factory::timings());
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let exit = coordinator.run(shutdown_rx).await;
    assert_eq!(exit, Exit::Restart("read timed out, waiting 0s then restarting".to_owned()));

    assert_eq!(
        h.transport.calls(),
        vec![Call::Write(b"QPGS1".to_vec()), Call::Read, Call::Close]
    );
    // the second poll was never attempted
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.find("next").unwrap().command, "QPGS2");

    let errors: Vec<_> = h.publisher.on_topic("stats/error").into_iter().map(|m| m.payload).collect();
    assert_eq!(
        errors,
        vec![
            "QPGS1: read returned nothing".to_owned(),
            "read timed out, waiting 0s then restarting".to_owned(),
        ]
    );

    let stats = coordinator.stats();
    assert_eq!(stats.dispatched, 1);
    assert_eq!(stats.fatal_reads, 1);
}

#[tokio::test]
async fn recoverable_failures_keep_the_loop_going() {
    let mut corrupt = Factory::status_frame();
    corrupt[10] = b'X';

    let transport = MockTransport::new();
    transport.reply(corrupt);
    transport.reply(Factory::frame("(2 92932004102453 L"));
    transport.reply(Factory::status_frame());
    // the fourth read has nothing scripted
    let h = Harness::new(transport);

    let queue = WorkQueue::new(10);
    for command in ["QPGS1", "QPGS2", "QPGS1", "QID"] {
        queue.enqueue(Factory::queued(command)).unwrap();
    }

    let coordinator = Coordinator::new(queue.clone(), h.dispatcher.clone(), Factory::timings());
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    assert!(matches!(coordinator.run(shutdown_rx).await, Exit::Restart(_)));
    assert!(queue.is_empty());

    let stats = coordinator.stats();
    assert_eq!(stats.dispatched, 4);
    assert_eq!(stats.failures, 3);
    assert_eq!(stats.status_records, 1);
    assert_eq!(stats.fatal_reads, 1);

    assert_eq!(h.last_record.get().unwrap().inverter_index, 1);
    assert_eq!(h.transport.calls().last(), Some(&Call::Close));
}

#[tokio::test]
async fn partial_frame_takes_the_restart_path() {
    let transport = MockTransport::new();
    transport.fail(Error::Incomplete(b"(1 9293".to_vec()));
    transport.reply(Factory::frame(Factory::STATUS_PAYLOAD_UNIT_2));
    let h = Harness::new(transport);

    let queue = WorkQueue::new(10);
    queue.enqueue(Factory::queued("QPGS1")).unwrap();
    queue.enqueue(Factory::queued("QPGS2")).unwrap();

    let coordinator = Coordinator::new(queue.clone(), h.dispatcher.clone(), Factory::timings());
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    assert!(matches!(coordinator.run(shutdown_rx).await, Exit::Restart(_)));
    assert_eq!(
        h.transport.calls(),
        vec![Call::Write(b"QPGS1".to_vec()), Call::Read, Call::Close]
    );
    assert_eq!(queue.len(), 1);
    assert_eq!(coordinator.stats().fatal_reads, 1);
    assert_eq!(h.last_record.get(), None);
}

#[tokio::test]
async fn late_tail_of_a_frame_is_never_read_as_the_next_reply() {
    common_setup();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let tcp_port = listener.local_addr().unwrap().port();

    // answers QPGS1 too slowly, then QPGS2 promptly
    let device = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 8];
        socket.read_exact(&mut request).await.unwrap();

        let reply = Factory::status_frame();
        let (head, tail) = reply.split_at(40);
        socket.write_all(head).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        // the bridge may already have hung up
        let _ = socket.write_all(tail).await;

        if socket.read_exact(&mut request).await.is_ok() {
            let _ = socket.write_all(&Factory::frame(Factory::STATUS_PAYLOAD_UNIT_2)).await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    });

    let mut transport = StreamTransport::new("127.0.0.1", tcp_port, 1);
    transport.open().await.unwrap();

    let publisher = RecordingPublisher::new();
    let last_record = LastRecord::new();
    let dispatcher = Arc::new(
        Dispatcher::new(
            transport,
            Arc::new(publisher.clone()),
            last_record.clone(),
            Diagnostics::new("test"),
        )
        .with_timeouts(Duration::from_millis(50), Duration::from_millis(50)),
    );

    let queue = WorkQueue::new(10);
    for command in ["QPGS1", "QPGS2", "QPGS1"] {
        queue.enqueue(Factory::queued(command)).unwrap();
    }

    let coordinator = Coordinator::new(queue.clone(), dispatcher, Factory::timings());
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    assert!(matches!(coordinator.run(shutdown_rx).await, Exit::Restart(_)));
    assert_eq!(queue.len(), 2);
    assert_eq!(last_record.get(), None);
    assert!(publisher.on_topic("stats/qpgs1").is_empty());
    assert!(publisher.on_topic("stats/qpgs2").is_empty());

    device.await.unwrap();
}

#[tokio::test]
async fn shutdown_stops_an_idle_loop() {
    let h = Harness::new(MockTransport::new());
    let queue = WorkQueue::new(10);
    let coordinator = Coordinator::new(queue, h.dispatcher.clone(), Factory::timings());

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    shutdown_tx.send(()).unwrap();

    assert_eq!(coordinator.run(shutdown_rx).await, Exit::Shutdown);
    assert!(h.transport.calls().is_empty());
    assert_eq!(coordinator.stats().idle_cycles, 1);
}

#[tokio::test]
async fn shutdown_during_cooldown_wins_over_restart() {
    let h = Harness::new(MockTransport::new());
    let queue = WorkQueue::new(10);
    queue.enqueue(Factory::queued("QPGS1")).unwrap();

    let timings = coordinator::LoopTimings {
        restart_cooldown: Duration::from_secs(3600),
        ..Factory::timings()
    };
    let coordinator = Coordinator::new(queue, h.dispatcher.clone(), timings);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let stopper = async {
        // let the loop reach its cooldown
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(()).unwrap();
    };
    let (exit, _) = tokio::join!(coordinator.run(shutdown_rx), stopper);

    assert_eq!(exit, Exit::Shutdown);
    assert_eq!(h.transport.calls().last(), Some(&Call::Close));
}

#[tokio::test]
async fn scheduler_feeds_the_consumer() {
    let transport = MockTransport::new();
    transport.reply(Factory::status_frame());
    transport.reply(Factory::frame(Factory::STATUS_PAYLOAD_UNIT_2));
    let h = Harness::new(transport);

    let queue = WorkQueue::new(10);
    let scheduler = Scheduler::new(queue.clone(), vec![1, 2], 2);
    assert!(scheduler.poll(1));
    assert!(scheduler.poll(2));
    assert!(!scheduler.poll(1));

    let coordinator = Coordinator::new(queue.clone(), h.dispatcher.clone(), Factory::timings());
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    // once the backlog drains, one more poll goes unanswered and ends the run
    let feeder = async {
        while !queue.is_empty() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(scheduler.poll(1));
    };
    let (exit, _) = tokio::join!(coordinator.run(shutdown_rx), feeder);

    assert!(matches!(exit, Exit::Restart(_)));
    let published: Vec<_> = h.publisher.messages().into_iter().map(|m| m.topic).collect();
    assert!(published.starts_with(&["stats/qpgs1".to_owned(), "stats/qpgs2".to_owned()]));
    assert_eq!(coordinator.stats().status_records, 2);
}

#[tokio::test]
async fn scheduler_loop_stops_at_low_water_and_on_shutdown() {
    common_setup();
    let queue = WorkQueue::new(10);
    let scheduler = Scheduler::new(queue.clone(), vec![1, 2], 2)
        .with_delays(Duration::ZERO, Duration::from_millis(2));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let stopper = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(()).unwrap();
    };
    let (result, _) = tokio::join!(scheduler.start(shutdown_rx), stopper);
    assert!(result.is_ok());

    let commands: Vec<_> = queue.list().into_iter().map(|c| c.command).collect();
    assert_eq!(commands, vec!["QPGS1", "QPGS2"]);
}

#[tokio::test]
async fn scheduler_survives_an_unbounded_jitter() {
    let queue = WorkQueue::new(10);
    let scheduler = Scheduler::new(queue.clone(), vec![1], 2).with_delays(Duration::from_secs(15), Duration::MAX);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let stopper = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(()).unwrap();
    };
    let (result, _) = tokio::join!(scheduler.start(shutdown_rx), stopper);
    assert!(result.is_ok());
    assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn scheduler_needs_units() {
    let scheduler = Scheduler::new(WorkQueue::new(10), vec![], 2);
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    assert!(scheduler.start(shutdown_rx).await.is_err());
}
