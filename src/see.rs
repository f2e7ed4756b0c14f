//! Static Exchange Evaluation: the net material swing of a capture sequence
//! on one square, assuming both sides always recapture with their least
//! valuable attacker.

use crate::board::{BitBoard, Board, ChessMove, Piece, Square};
use crate::types::Score;

const PIECE_VALUE: [Score; 6] = [100, 320, 330, 500, 900, 20_000];

#[inline]
fn value_of(piece: Piece) -> Score {
    PIECE_VALUE[piece.to_index()]
}

/// Least valuable piece among `attackers`, with its square.
fn least_valuable(board: &Board, attackers: BitBoard) -> Option<(Square, Piece)> {
    let mut best: Option<(Square, Piece)> = None;
    for sq in attackers.iter() {
        let piece = board
            .piece_on(sq)
            .expect("attacker bit must correspond to an occupied square");
        match best {
            Some((_, p)) if value_of(p) <= value_of(piece) => {}
            _ => best = Some((sq, piece)),
        }
    }
    best
}

/// Net material value of playing `mv` and continuing the exchange on
/// `mv`'s destination square with both sides recapturing optimally.
///
/// Positive means the side to move comes out ahead; negative means the
/// exchange loses material for the side to move.
pub fn see(board: &Board, mv: ChessMove) -> Score {
    let from = mv.get_source();
    let to = mv.get_dest();

    let moving_piece = board
        .piece_on(from)
        .expect("see called on a move with no piece on its source square");

    let is_en_passant =
        moving_piece == Piece::Pawn && board.piece_on(to).is_none() && from.file() != to.file();

    let mut occupied = board.combined();
    occupied &= !BitBoard::from_square(from);

    let mut gain = [0 as Score; 32];
    let mut depth = 0usize;

    gain[0] = if is_en_passant {
        value_of(Piece::Pawn)
    } else {
        board.piece_on(to).map(value_of).unwrap_or(0)
    };

    if is_en_passant {
        let captured_sq = Square::make_square(from.rank(), to.file());
        occupied &= !BitBoard::from_square(captured_sq);
    }

    let mut attacker_value = value_of(moving_piece);
    let mut side = !board.side_to_move();

    loop {
        let side_attackers = board.attackers_to(to, occupied) & board.color_combined(side);
        let Some((sq, piece)) = least_valuable(board, side_attackers) else {
            break;
        };

        depth += 1;
        gain[depth] = attacker_value - gain[depth - 1];

        // Further recaptures can't improve on a line that's already lost for
        // this side even in the best case; stop early.
        if gain[depth].max(-gain[depth - 1]) < 0 {
            break;
        }

        occupied &= !BitBoard::from_square(sq);
        attacker_value = value_of(piece);
        side = !side;
    }

    while depth > 0 {
        gain[depth - 1] = -gain[depth - 1].max(gain[depth]);
        depth -= 1;
    }

    gain[0]
}
