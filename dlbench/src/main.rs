fn main() -> anyhow::Result<()> {
    dlbench::cli::execute()
}
