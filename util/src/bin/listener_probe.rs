use clap::{App, Arg};
use gdf_dataframe::GdfRecord;
use gdf_net::frame::{self, MSG_HDR_SIZE};
use mio::net::TcpStream;
use mio::{Events, Poll, PollOpt, Ready, Token};
use std::io::Read;
use std::net::SocketAddr;

const STREAM: Token = Token(0);

fn main() {
    let matches = App::new("listener_probe")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Connects to a cluster socket writer and prints each framed dataframe record it sends.")
        .arg(
            Arg::with_name("ADDRESS")
                .help("host:port of the cluster socket writer to probe")
                .required(true),
        )
        .get_matches();

    let address: SocketAddr = matches.value_of("ADDRESS").unwrap().parse().expect("invalid ADDRESS");

    let mut stream = TcpStream::connect(&address).expect("failed to connect");
    let poll = Poll::new().expect("failed to create poll");
    poll.register(&stream, STREAM, Ready::readable(), PollOpt::edge())
        .expect("failed to register stream");

    let mut events = Events::with_capacity(1024);
    let mut pending = Vec::new();
    let mut chunk = [0u8; 65536];

    println!("probing {}", address);

    loop {
        poll.poll(&mut events, None).expect("poll failed");

        for event in &events {
            if event.token() != STREAM {
                continue;
            }

            loop {
                match stream.read(&mut chunk) {
                    Ok(0) => {
                        println!("peer closed the connection");
                        return;
                    }
                    Ok(n) => pending.extend_from_slice(&chunk[..n]),
                    Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                    Err(err) => {
                        println!("read error: {}", err);
                        return;
                    }
                }
            }

            while pending.len() >= MSG_HDR_SIZE {
                let declared = frame::read_header(&pending) as usize;
                if pending.len() < MSG_HDR_SIZE + declared {
                    break;
                }

                let payload = &pending[MSG_HDR_SIZE..MSG_HDR_SIZE + declared];
                match GdfRecord::decode(payload) {
                    Ok(record) => println!(
                        "key={:<6} kind={:?} name={:<16} num_rows={:<6} bytes={}",
                        record.key,
                        record.kind,
                        record.name,
                        record.num_rows,
                        record.data.len()
                    ),
                    Err(err) => println!("malformed record: {}", err),
                }

                pending.drain(..MSG_HDR_SIZE + declared);
            }
        }
    }
}
