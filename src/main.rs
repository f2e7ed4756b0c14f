use onyx::board;
use onyx::uci;

fn main() {
    board::init();
    uci::run();
}
