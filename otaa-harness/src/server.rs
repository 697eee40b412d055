//! The receive loop tying the forwarder to the join server.
use std::io;
use std::net::SocketAddr;

use rand_core::RngCore;
use tracing::info;

use crate::forwarder::{Forwarder, ForwarderStats};
use crate::join::{JoinServer, Outcome};

pub struct Server<R> {
    forwarder: Forwarder,
    join: JoinServer<R>,
}

impl<R: RngCore> Server<R> {
    pub fn new(forwarder: Forwarder, join: JoinServer<R>) -> Self {
        Server { forwarder, join }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.forwarder.local_addr()
    }

    pub fn stats(&self) -> ForwarderStats {
        self.forwarder.stats()
    }

    pub fn join_server(&self) -> &JoinServer<R> {
        &self.join
    }

    /// Receives one datagram and handles every packet in it, downlinks
    /// included, before returning.
    pub async fn step(&mut self) -> io::Result<Vec<Outcome>> {
        let packets = self.forwarder.receive().await?;
        let mut outcomes = Vec::with_capacity(packets.len());
        for pkt in &packets {
            outcomes.push(self.join.handle(pkt, &mut self.forwarder).await);
        }
        Ok(outcomes)
    }

    /// Runs until the socket fails.
    pub async fn run(&mut self) -> io::Result<()> {
        info!(
            "Semtech packet forwarder listening on {} ({})",
            self.forwarder.local_addr()?,
            self.forwarder.plan().region()
        );
        loop {
            self.step().await?;
        }
    }
}
