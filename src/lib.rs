/*! Tree edit distance between labeled ordered trees.

 Trees are parsed from bracket notation into arena-backed structures,
 flattened into flat index arrays and compared with the APTED+ algorithm
 by Pawlik and Augsten. The optimal edit mapping can be reconstructed
 after a distance computation and replayed against a caller-supplied
 operation executor.
!*/

pub mod cost;
pub mod indexing;
pub mod parsing;
pub mod ted;
