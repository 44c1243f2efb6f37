use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    sqlmate::cli::main()
}
