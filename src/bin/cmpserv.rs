use std::process;

use cmpserv::cli::options::Command;
use cmpserv::cli::report::Report;

fn main() {
    let status = match Command::from_args() {
        Command::Respond(respond) => {
            let format = respond.format;
            respond.run().report(format)
        }
    };
    process::exit(status);
}
