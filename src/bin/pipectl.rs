use clap::{App, Arg, ArgMatches, SubCommand};
use fspipe::{
    channel::ChunkLayout,
    config::DEFAULT_CHUNK_BASE,
    pipe::{chunk::{FIRST_DIR, SECOND_DIR}, shm::BACKING_FILE},
    ClientConfig, ConnectionRequest, Pipe, PipeClient, PipeConfig, PipeError, PipeKind, PipeServer,
    ReadableChannel, Result, ServerConfig, SharedMemoryPipe, WritableChannel,
};
use log::{error, info};
use std::{
    io::{self, BufRead},
    path::Path,
    thread,
    time::Duration,
};

fn main() -> Result<()> {
    env_logger::init();

    let matches = App::new("pipectl")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Filesystem pipe server, client and inspector")
        .subcommand(
            SubCommand::with_name("serve")
                .about("Accept connections and echo every line back")
                .arg(connect_dir_arg())
                .arg(
                    Arg::with_name("pipe_dir")
                        .short("p")
                        .long("pipe-dir")
                        .value_name("DIR")
                        .help("Directory holding allocated pipes")
                        .required(true)
                        .takes_value(true),
                )
                .arg(types_arg())
                .arg(interval_arg())
                .arg(
                    Arg::with_name("count")
                        .short("n")
                        .long("count")
                        .value_name("N")
                        .help("Stop after accepting N connections")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("cleanup")
                        .long("cleanup")
                        .help("Delete pipe resources once both sides closed"),
                ),
        )
        .subcommand(
            SubCommand::with_name("connect")
                .about("Send lines to a server and print the replies")
                .arg(connect_dir_arg())
                .arg(types_arg())
                .arg(interval_arg())
                .arg(
                    Arg::with_name("timeout")
                        .short("t")
                        .long("timeout")
                        .value_name("MS")
                        .help("Connect timeout in milliseconds, 0 waits forever")
                        .default_value("5000")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("message")
                        .short("m")
                        .long("message")
                        .value_name("TEXT")
                        .help("Send this line instead of reading stdin")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("cleanup")
                        .long("cleanup")
                        .help("Delete pipe resources once both sides closed"),
                ),
        )
        .subcommand(
            SubCommand::with_name("inspect")
                .about("Show the state of a pipe's backing resources")
                .arg(
                    Arg::with_name("path")
                        .value_name("PATH")
                        .help("Pipe directory or shared-memory backing file")
                        .required(true)
                        .index(1),
                ),
        )
        .subcommand(
            SubCommand::with_name("info")
                .about("Show version and supported pipe types"),
        )
        .get_matches();

    match matches.subcommand() {
        ("serve", Some(serve_matches)) => serve(serve_matches),
        ("connect", Some(connect_matches)) => connect(connect_matches),
        ("inspect", Some(inspect_matches)) => inspect(inspect_matches),
        ("info", Some(_)) => show_info(),
        _ => {
            println!("Use --help for usage information");
            Ok(())
        }
    }
}

fn connect_dir_arg() -> Arg<'static, 'static> {
    Arg::with_name("connect_dir")
        .short("c")
        .long("connect-dir")
        .value_name("DIR")
        .help("Rendezvous directory shared with the peer")
        .required(true)
        .takes_value(true)
}

fn types_arg() -> Arg<'static, 'static> {
    Arg::with_name("types")
        .long("types")
        .value_name("LIST")
        .help("Comma-separated pipe types (shared-memory, chunk-file)")
        .takes_value(true)
}

fn interval_arg() -> Arg<'static, 'static> {
    Arg::with_name("interval")
        .short("i")
        .long("interval")
        .value_name("MS")
        .help("Poll interval in milliseconds")
        .default_value("100")
        .takes_value(true)
}

fn parse_millis(matches: &ArgMatches, name: &str) -> Result<Duration> {
    matches
        .value_of(name)
        .unwrap_or("0")
        .parse()
        .map(Duration::from_millis)
        .map_err(|_| PipeError::invalid_parameter(name, "Expected milliseconds"))
}

fn parse_types(matches: &ArgMatches) -> Result<Option<Vec<PipeKind>>> {
    matches
        .value_of("types")
        .map(|list| {
            list.split(',')
                .map(|name| name.trim().parse())
                .collect::<Result<Vec<PipeKind>>>()
        })
        .transpose()
}

fn pipe_config(matches: &ArgMatches) -> Result<PipeConfig> {
    Ok(PipeConfig::new()
        .with_poll_interval(parse_millis(matches, "interval")?)
        .with_clean_up_on_close(matches.is_present("cleanup")))
}

fn read_line(source: &mut dyn ReadableChannel) -> Result<Option<String>> {
    let mut line = Vec::new();
    while let Some(byte) = source.read_byte()? {
        if byte == b'\n' {
            return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
        }
        line.push(byte);
    }
    Ok((!line.is_empty()).then(|| String::from_utf8_lossy(&line).into_owned()))
}

fn echo(mut pipe: impl Pipe) -> Result<()> {
    let mut buf = [0u8; 4096];
    while let Some(n) = pipe.source().read(&mut buf)? {
        pipe.sink().write_all(&buf[..n])?;
    }
    pipe.close()
}

fn serve(matches: &ArgMatches) -> Result<()> {
    let mut config = ServerConfig::new(
        matches.value_of("connect_dir").unwrap_or_default(),
        matches.value_of("pipe_dir").unwrap_or_default(),
    )
    .with_pipe_config(pipe_config(matches)?);
    if let Some(types) = parse_types(matches)? {
        config = config.with_supported(&types);
    }
    let limit: Option<usize> = matches
        .value_of("count")
        .map(str::parse::<usize>)
        .transpose()
        .map_err(|_| PipeError::invalid_parameter("count", "Invalid count"))?;

    let mut server = PipeServer::new(config)?;
    println!("Serving on {}", server.config().connect_dir.display());

    let mut workers = Vec::new();
    for connection in server.incoming().take(limit.unwrap_or(usize::MAX)) {
        let connection = connection?;
        println!("Accepted {} ({})", connection.token(), connection.kind());

        let token = connection.token().clone();
        workers.push(thread::spawn(move || {
            if let Err(e) = echo(connection.into_pipe()) {
                error!("Connection {} failed: {}", token, e);
            }
            info!("Connection {} finished", token);
        }));
    }

    for worker in workers {
        let _ = worker.join();
    }
    Ok(())
}

fn connect(matches: &ArgMatches) -> Result<()> {
    let config = ClientConfig::new(matches.value_of("connect_dir").unwrap_or_default())
        .with_pipe_config(pipe_config(matches)?);
    let client = PipeClient::new(config)?;

    let mut request = ConnectionRequest::connect();
    if let Some(types) = parse_types(matches)? {
        request = request.with_accept_types(&types);
    }

    let mut pipe = client.connect(request, parse_millis(matches, "timeout")?)?;
    eprintln!("Connected over {}", pipe.kind());

    let lines: Vec<String> = match matches.value_of("message") {
        Some(message) => vec![message.to_string()],
        None => io::stdin()
            .lock()
            .lines()
            .collect::<io::Result<_>>()?,
    };

    for line in lines {
        pipe.sink().write_all(line.as_bytes())?;
        pipe.sink().write_byte(b'\n')?;
        match read_line(pipe.source())? {
            Some(reply) => println!("{}", reply),
            None => break,
        }
    }

    pipe.close()
}

fn inspect(matches: &ArgMatches) -> Result<()> {
    let path = Path::new(matches.value_of("path").unwrap_or_default());

    let shm_file = if path.is_dir() { path.join(BACKING_FILE) } else { path.to_path_buf() };
    if shm_file.is_file() {
        let [first, second] = SharedMemoryPipe::inspect(&shm_file)?;
        println!("Shared-memory pipe {}", shm_file.display());
        for (label, ring) in [("first half (guest -> host)", first), ("second half (host -> guest)", second)] {
            println!("  {}:", label);
            println!("    initialized: {}", ring.initialized);
            println!("    closed:      {}", ring.closed);
            println!("    head/tail:   {}/{}", ring.head, ring.tail);
            println!("    buffered:    {} of {} bytes", ring.len(), ring.capacity - 1);
        }
        return Ok(());
    }

    println!("Chunk-file pipe {}", path.display());
    for (label, dir) in [("a (guest -> host)", FIRST_DIR), ("b (host -> guest)", SECOND_DIR)] {
        let layout = ChunkLayout::new(path.join(dir), DEFAULT_CHUNK_BASE);
        let chunks = layout.list_chunks()?;
        println!("  {}:", label);
        println!("    chunks: {}", chunks.len());
        if let (Some(first), Some(last)) = (chunks.first(), chunks.last()) {
            println!("    range:  {}..={}", first, last);
        }
        println!("    closed: {}", layout.is_marked_closed());
    }
    Ok(())
}

fn show_info() -> Result<()> {
    println!("pipectl {}", fspipe::VERSION);
    println!("Supported pipe types:");
    for kind in PipeKind::ALL {
        println!("  - {}", kind);
    }
    Ok(())
}
