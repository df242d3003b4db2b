fn main() {
    if let Err(err) = todo_list_lib::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
