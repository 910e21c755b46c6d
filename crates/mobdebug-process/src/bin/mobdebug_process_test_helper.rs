use std::{
    env,
    io::{self, Write},
    process, thread,
    time::Duration,
};

fn required(value: Option<String>, flag: &str) -> String {
    value.unwrap_or_else(|| {
        eprintln!("missing value for {flag}");
        process::exit(2);
    })
}

fn parse_u64(value: Option<String>, flag: &str) -> u64 {
    let value = required(value, flag);
    value.parse().unwrap_or_else(|_| {
        eprintln!("invalid u64 for {flag}: {value}");
        process::exit(2);
    })
}

fn parse_i32(value: Option<String>, flag: &str) -> i32 {
    let value = required(value, flag);
    value.parse().unwrap_or_else(|_| {
        eprintln!("invalid i32 for {flag}: {value}");
        process::exit(2);
    })
}

fn main() {
    let mut exit_code = 0;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--stdout" => {
                let text = required(args.next(), "--stdout");
                let mut stdout = io::stdout().lock();
                stdout.write_all(text.as_bytes()).unwrap();
                stdout.flush().unwrap();
            }
            "--stderr" => {
                let text = required(args.next(), "--stderr");
                let mut stderr = io::stderr().lock();
                stderr.write_all(text.as_bytes()).unwrap();
                stderr.flush().unwrap();
            }
            "--print-env" => {
                let name = required(args.next(), "--print-env");
                let value = env::var(&name).unwrap_or_else(|_| "<unset>".to_owned());
                println!("{name}={value}");
            }
            "--print-cwd" => {
                let cwd = env::current_dir().unwrap();
                println!("{}", cwd.display());
            }
            "--sleep-ms" => {
                let ms = parse_u64(args.next(), "--sleep-ms");
                thread::sleep(Duration::from_millis(ms));
            }
            "--exit-code" => {
                exit_code = parse_i32(args.next(), "--exit-code");
            }
            other => {
                eprintln!("unknown argument: {other}");
                process::exit(2);
            }
        }
    }
    process::exit(exit_code);
}
